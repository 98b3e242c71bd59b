//! Chrome DevTools Protocol plumbing
//!
//! Single WebSocket connection, multiplexed sessions. Commands are matched
//! to replies by id; unsolicited frames fan out to event subscribers.

pub mod client;
pub mod protocol;
pub mod session;

pub use client::CdpClient;
pub use protocol::{CdpEvent, CdpMessage, CdpRequest, CdpResponse};
pub use session::CdpSession;
