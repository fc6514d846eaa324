use super::messages::Message;
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// kind (1 byte) + payload length (u32, big-endian)
pub const HEADER_LENGTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Auth = 1,
    AuthOk = 2,
    AuthFail = 3,
    ListConnectorInfos = 4,
    ConnectorInfoList = 5,
    InvokeOperation = 6,
    OperationResult = 7,
    OperationResultChunk = 8,
    OperationError = 9,
    StreamCredit = 10,
    CancelOperation = 11,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Auth => "AUTH",
            MessageKind::AuthOk => "AUTH_OK",
            MessageKind::AuthFail => "AUTH_FAIL",
            MessageKind::ListConnectorInfos => "LIST_CONNECTOR_INFOS",
            MessageKind::ConnectorInfoList => "CONNECTOR_INFO_LIST",
            MessageKind::InvokeOperation => "INVOKE_OPERATION",
            MessageKind::OperationResult => "OPERATION_RESULT",
            MessageKind::OperationResultChunk => "OPERATION_RESULT_CHUNK",
            MessageKind::OperationError => "OPERATION_ERROR",
            MessageKind::StreamCredit => "STREAM_CREDIT",
            MessageKind::CancelOperation => "CANCEL_OPERATION",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            1 => MessageKind::Auth,
            2 => MessageKind::AuthOk,
            3 => MessageKind::AuthFail,
            4 => MessageKind::ListConnectorInfos,
            5 => MessageKind::ConnectorInfoList,
            6 => MessageKind::InvokeOperation,
            7 => MessageKind::OperationResult,
            8 => MessageKind::OperationResultChunk,
            9 => MessageKind::OperationError,
            10 => MessageKind::StreamCredit,
            11 => MessageKind::CancelOperation,
            other => return Err(ProtocolError::UnknownMessageKind(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw frame: message kind plus its undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_length: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_length: MAX_FRAME_LENGTH,
        }
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let kind = MessageKind::try_from(src[0])?;
        let length = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if length > self.max_length {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_length,
            });
        }

        let total = HEADER_LENGTH + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let payload = src.split_to(length).freeze();
        Ok(Some(Frame { kind, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = frame.payload.len();
        if length > self.max_length {
            return Err(ProtocolError::FrameTooLarge {
                length,
                max: self.max_length,
            });
        }

        dst.reserve(HEADER_LENGTH + length);
        dst.put_u8(frame.kind as u8);
        dst.put_u32(length as u32);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Frames plus JSON payload decoding into [`Message`]s.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    frames: FrameCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            frames: FrameCodec::with_max_length(max_length),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.frames.decode(src)? {
            Some(frame) => Message::from_frame(frame).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let frame = message.into_frame()?;
        self.frames.encode(frame, dst)
    }
}
