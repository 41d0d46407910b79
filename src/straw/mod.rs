//! Flow-controlled byte buffers between the wire and the upstream stream
//!
//! # Architecture
//!
//! ```text
//!            client (tunnel)                         relay (upstream)
//!                 │                                         ▲
//!   TCP payload   ▼                                         │
//!   ┌──────────────────────┐   Straw (bounded)   ┌──────────┴──────────┐
//!   │ UpstreamStraw        │ ──────────────────▶ │ upstream pump task  │
//!   │ in-order, RCV.NXT    │                     │ (protocol codec)    │
//!   └──────────────────────┘                     │                     │
//!   ┌──────────────────────┐   Straw (bounded)   │                     │
//!   │ DownstreamStraw      │ ◀────────────────── │                     │
//!   │ SND.UNA / SND.NXT    │                     └─────────────────────┘
//!   └──────────────────────┘
//!                 │ segments (peek, discard on ACK)
//!                 ▼
//!            client (tunnel)
//! ```
//!
//! Each [`Straw`] has exactly one writer and one reader. The flow-control
//! wrappers are owned by the connection task; the pump holds the other end
//! of each straw.

mod buffer;
mod downstream;
mod error;
mod upstream;

pub use buffer::Straw;
pub use downstream::DownstreamStraw;
pub use error::StrawError;
pub use upstream::UpstreamStraw;
