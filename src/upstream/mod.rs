//! Upstream relay side of each connection
//!
//! - [`UpstreamConnector`]: admission, opens one stream per connection
//! - [`protocol`]: the discriminator and length-prefix framing
//! - [`UpstreamPump`]: moves bytes between the straws and the stream

mod connector;
mod error;
pub mod protocol;
mod pump;

pub use connector::{TcpUpstreamConnector, UpstreamConnector, UpstreamStream};
pub use error::UpstreamError;
pub use protocol::Request;
pub use pump::{PumpOptions, UpstreamPump};
