//! Transports carrying the link's text frames
//!
//! - `websocket`: the production transport (tokio-tungstenite)
//! - `memory`: an in-process transport driven by the caller

pub mod memory;
pub mod traits;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryPeer, MemoryTransportStream, PeerFrame};
pub use traits::{CloseInfo, TransportConnector, TransportEvent, TransportStream};
pub use websocket::{WebSocketConnector, WebSocketTransportStream};
