//! Realtime session with the remote model
//!
//! Protocol types, the bounded outbound queue, and the websocket transport.

mod outbound;
pub mod protocol;
mod transport;

pub use outbound::{OutboundQueue, PushOutcome};
pub use protocol::{ClientMessage, ServerMessage};
pub use transport::{
    Connector, LiveConnector, LiveTransport, SendOutcome, Transport, TransportEvent,
    TransportEvents, TransportState, TurnCounter, session_url,
};
