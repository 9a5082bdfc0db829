//! Newline-delimited JSON framing.
//!
//! Each frame is one line holding one JSON-RPC message. Decoding never fails
//! on bad content: a line that is not valid JSON, or is JSON but not a
//! message, is yielded as [`Frame::Malformed`] so the session can report it
//! and keep reading. The same holds for a line that is not valid UTF-8.
//! Only I/O failures end the stream.

use serde_json::Value;
use std::io;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::Error;
use crate::mcp::protocol::{
    error_codes, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message,
    RequestId,
};

/// Default upper bound for a single frame (8 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Message(Message),
    Malformed(FrameError),
}

/// A frame that could not be turned into a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameError {
    /// Id of the offending request, when one could be recovered.
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

impl FrameError {
    fn parse(message: impl Into<String>) -> Self {
        Self {
            id: None,
            error: JsonRpcError::new(error_codes::PARSE_ERROR, message),
        }
    }

    fn invalid(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            id,
            error: JsonRpcError::new(error_codes::INVALID_REQUEST, message),
        }
    }

    /// The error response a peer should receive for this frame.
    pub fn to_response(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.id.clone(), self.error.clone())
    }
}

/// Classify one JSON value as a protocol message.
pub fn parse_message(value: Value) -> std::result::Result<Message, FrameError> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None if value.is_array() => {
            return Err(FrameError::invalid(None, "Batch messages are not supported"))
        }
        None => return Err(FrameError::invalid(None, "Message must be a JSON object")),
    };

    let id = match obj.get("id") {
        None => None,
        Some(raw) => match serde_json::from_value::<RequestId>(raw.clone()) {
            Ok(id) => Some(id),
            Err(_) if raw.is_null() => None,
            Err(_) => return Err(FrameError::invalid(None, "Id must be a string or an integer")),
        },
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(FrameError::invalid(id, "Missing or unsupported jsonrpc version"));
    }

    let has_method = obj.contains_key("method");
    let has_outcome = obj.contains_key("result") || obj.contains_key("error");

    if has_method {
        if !obj.get("method").is_some_and(Value::is_string) {
            return Err(FrameError::invalid(id, "Method must be a string"));
        }
        if let Some(params) = obj.get("params") {
            if !(params.is_object() || params.is_array() || params.is_null()) {
                return Err(FrameError::invalid(id, "Params must be an object or an array"));
            }
        }
        let message = if obj.get("id").is_some_and(|raw| !raw.is_null()) {
            serde_json::from_value::<JsonRpcRequest>(value).map(Message::Request)
        } else {
            serde_json::from_value::<JsonRpcNotification>(value).map(Message::Notification)
        };
        return message.map_err(|e| FrameError::invalid(id, e.to_string()));
    }

    if has_outcome {
        return serde_json::from_value::<JsonRpcResponse>(value)
            .map(Message::Response)
            .map_err(|e| FrameError::invalid(id, e.to_string()));
    }

    Err(FrameError::invalid(id, "Message has neither a method nor a result"))
}

/// Parse one frame of text into a message.
pub fn decode_frame(text: &str) -> std::result::Result<Message, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FrameError::parse(format!("Parse error: {}", e)))?;
    parse_message(value)
}

/// Encode one message as the exact bytes written to the wire, newline included.
pub fn encode_frame(message: &Message) -> crate::error::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Codec for newline-delimited JSON-RPC messages.
#[derive(Debug, Clone)]
pub struct McpCodec {
    lines: LinesCodec,
}

impl McpCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn frame_from_line(line: String) -> Option<Frame> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match decode_frame(trimmed) {
            Ok(message) => Frame::Message(message),
            Err(err) => Frame::Malformed(err),
        })
    }

    /// Turn a line-level failure into a malformed frame when the offending
    /// line has already been consumed. Other I/O errors end the stream.
    fn recover(err: LinesCodecError) -> Result<Option<Frame>, Error> {
        match err {
            // LinesCodec discards the rest of the oversized line on its own.
            LinesCodecError::MaxLineLengthExceeded => Ok(Some(Frame::Malformed(
                FrameError::parse("Frame exceeds maximum length"),
            ))),
            LinesCodecError::Io(e) if e.kind() == io::ErrorKind::InvalidData => Ok(Some(
                Frame::Malformed(FrameError::parse("Invalid UTF-8 in frame")),
            )),
            LinesCodecError::Io(e) => Err(Error::Io(e)),
        }
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for McpCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = Self::frame_from_line(line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => return Self::recover(e),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = Self::frame_from_line(line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => return Self::recover(e),
            }
        }
    }
}

impl Encoder<Message> for McpCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Error> {
        let json = serde_json::to_string(&item)?;
        self.lines.encode(json, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => Error::Io(e),
            LinesCodecError::MaxLineLengthExceeded => {
                Error::Transport("Outgoing frame exceeds maximum length".to_string())
            }
        })
    }
}
