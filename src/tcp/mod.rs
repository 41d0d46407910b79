//! User-space TCP
//!
//! Sequence arithmetic, the retransmission queue and the per-connection
//! state machine. Nothing in this module performs I/O; the proxy feeds
//! events in and writes the resulting packets out.

mod connection;
mod error;
mod isn;
mod reply;
mod retransmission;
mod segment;
mod sequence;
mod state;

pub use connection::{ConnectionOptions, Effect, Event, TcpConnection, Transition};
pub use error::{RetransmissionError, SequenceError};
pub use isn::{initial_sequence_number, isn_at};
pub use reply::{make_packet, reset_for};
pub use retransmission::RetransmissionQueue;
pub use segment::Segment;
pub use sequence::{SequenceNumber, SequenceNumberRange, MAX_BOUND_INCREASE};
pub use state::TcpState;
