//! Newline-delimited framing for agent stdio.
//!
//! Wraps [`LinesCodec`] with a maximum line length so an agent that never
//! emits a newline cannot grow the buffer without bound. Splitting is done
//! on the accumulated bytes, so where the OS happened to cut a read has no
//! effect on the frames produced.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

/// Longest inbound line accepted: 1 MiB
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Item produced by [`FrameCodec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A line longer than [`MAX_LINE_BYTES`] was skipped
    Oversized,
    /// A line that was not valid UTF-8 was skipped
    Malformed,
}

#[derive(Debug)]
pub struct FrameCodec(LinesCodec);

impl FrameCodec {
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }

    pub fn with_max_length(max: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        match self.0.decode(src) {
            Ok(Some(line)) => Ok(Some(Frame::Line(line))),
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
            // The line is already split off the buffer when its UTF-8 check fails.
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Malformed))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }

    /// An unterminated tail at EOF is dropped, not delivered.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    warn!("Dropping {} bytes of unterminated output at EOF", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode(item, dst).map_err(|e| match e {
            LinesCodecError::Io(io) => io,
            LinesCodecError::MaxLineLengthExceeded => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long")
            }
        })
    }
}
