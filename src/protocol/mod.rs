//! Wire protocol between connector servers and remote clients.
//!
//! Every frame is `kind: u8`, `length: u32` (big-endian) and a JSON payload.

pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{Frame, FrameCodec, MessageCodec, MessageKind, HEADER_LENGTH, MAX_FRAME_LENGTH};
pub use error::ErrorPayload;
pub use messages::{
    AuthAccepted, AuthRejected, AuthRequest, InvokeRequest, Message, OperationRequest,
    OperationResponse, StreamCredit, DEFAULT_STREAM_WINDOW,
};

/// Version reported in handshakes.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
