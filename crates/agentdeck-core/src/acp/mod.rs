//! ACP (Agent Client Protocol) implementation
//!
//! This module implements the client side of the ACP protocol for communicating
//! with AI agents via JSON-RPC over stdin/stdout.
//!
//! # Architecture
//!
//! - `Transport` - line framing over the agent's stdio
//! - `AcpConnection` - request correlation, update fan-out, capability replies
//! - `AgentClient` - callback interface for handling agent requests
//! - `SessionPool` - bounded set of live sessions, one process each

mod client_delegate;
mod codec;
mod connection;
mod decoder;
mod protocol;
mod session;
pub mod traits;
mod transport;

pub use traits::AgentClient;

pub use client_delegate::{dispatch, WorkspaceClient};
pub use codec::{Frame, FrameCodec, MAX_LINE_BYTES};
pub use connection::{AcpConnection, ConnectOptions, UpdateSubscription};
pub use decoder::{decode_session_update, DecodedUpdate};
pub use protocol::{parse_result, AcpMessage, ProtocolHandler};
pub use session::{ActiveSession, PooledSession, ProcessConnector, SessionConnector, SessionPool};
pub use transport::{Transport, TransportEvent};
