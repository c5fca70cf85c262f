// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON-RPC framing over the agent's stdio streams: exactly
//! one UTF-8 JSON object per LF-terminated line.

use std::fmt;

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on a single frame's length before [`FramingError::LineTooLong`]
/// is raised.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug)]
pub enum FramingError {
    LineTooLong { limit: usize },
    InvalidUtf8(std::str::Utf8Error),
    InvalidJson(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineTooLong { limit } => write!(f, "line exceeded {limit} byte limit"),
            Self::InvalidUtf8(e) => write!(f, "invalid utf-8: {e}"),
            Self::InvalidJson(e) => write!(f, "invalid json: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for FramingError {}

impl From<std::io::Error> for FramingError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A stateless line-per-JSON-value codec. Blank lines on input are skipped
/// rather than treated as framing errors.
pub struct JsonRpcCodec {
    max_line_bytes: usize,
}

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self { max_line_bytes: DEFAULT_MAX_LINE_BYTES }
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self { max_line_bytes }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Item = Value;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline_at) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_line_bytes {
                    return Err(FramingError::LineTooLong { limit: self.max_line_bytes });
                }
                return Ok(None);
            };

            if newline_at > self.max_line_bytes {
                return Err(FramingError::LineTooLong { limit: self.max_line_bytes });
            }

            let mut line = src.split_to(newline_at + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                continue;
            }

            let text = std::str::from_utf8(&line).map_err(FramingError::InvalidUtf8)?;
            let value: Value = serde_json::from_str(text).map_err(FramingError::InvalidJson)?;
            return Ok(Some(value));
        }
    }
}

impl Encoder<Value> for JsonRpcCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = serde_json::to_vec(&item).map_err(FramingError::InvalidJson)?;
        dst.reserve(text.len() + 1);
        dst.extend_from_slice(&text);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
