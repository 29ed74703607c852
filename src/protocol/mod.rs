//! Wire-level message model.
//!
//! Framing and codecs live with the concrete transports; this module only
//! defines the framed units a connection carries.

pub mod messages;

pub use messages::{Heartbeat, WireMessage};
