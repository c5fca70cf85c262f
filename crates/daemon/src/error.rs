// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical error codes shared across HTTP, SSE, and WebSocket transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    ThreadNotFound,
    JobNotFound,
    ApprovalNotFound,
    Unauthorized,
    BadRequest,
    Conflict,
    ThreadHasActiveJob,
    ThreadArchived,
    Gone,
    FsPathForbidden,
    AgentUnavailable,
    CursorExpired,
    PayloadTooLarge,
    TerminalDisabled,
    TerminalCursorExpired,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound | Self::ThreadNotFound | Self::JobNotFound | Self::ApprovalNotFound => 404,
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Conflict | Self::ThreadHasActiveJob | Self::ThreadArchived => 409,
            Self::Gone => 410,
            Self::FsPathForbidden => 403,
            Self::AgentUnavailable => 503,
            Self::CursorExpired => 409,
            Self::PayloadTooLarge => 413,
            Self::TerminalDisabled => 403,
            Self::TerminalCursorExpired => 409,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::ThreadNotFound => "THREAD_NOT_FOUND",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::ApprovalNotFound => "APPROVAL_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Conflict => "CONFLICT",
            Self::ThreadHasActiveJob => "THREAD_HAS_ACTIVE_JOB",
            Self::ThreadArchived => "THREAD_ARCHIVED",
            Self::Gone => "GONE",
            Self::FsPathForbidden => "FS_PATH_FORBIDDEN",
            Self::AgentUnavailable => "AGENT_UNAVAILABLE",
            Self::CursorExpired => "CURSOR_EXPIRED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::TerminalDisabled => "TERMINAL_DISABLED",
            Self::TerminalCursorExpired => "TERMINAL_CURSOR_EXPIRED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A daemon-level error carrying both a machine-readable code and a
/// human-readable message, convertible into an HTTP or WS error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
}

impl BridgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BridgeError {}

impl From<crate::agent::AgentRpcError> for BridgeError {
    fn from(err: crate::agent::AgentRpcError) -> Self {
        Self::new(ErrorCode::AgentUnavailable, err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
