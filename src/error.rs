//! Error and status taxonomy for the channel core.

use std::fmt;

/// Closed set of status codes every entry point reduces to.
///
/// Operations never panic or throw across an API boundary; they return one
/// of these, matched against a `last_error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Fail,
    MemErr,
    Timeout,
    NotImplemented,
    Break,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Fail => "fail",
            Status::MemErr => "memory error",
            Status::Timeout => "timeout",
            Status::NotImplemented => "not implemented",
            Status::Break => "break",
        };
        f.write_str(s)
    }
}

/// Length of the fixed `last_error` buffer historically carried per span and
/// per channel; messages are truncated to this length for fidelity.
pub const LAST_ERROR_LEN: usize = 128;

/// Errors that can occur when driving a span or channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZtError {
    #[error("{status}: {message}")]
    Status { status: Status, message: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("no channel available")]
    NoChannelAvailable,
    #[error("span not found: {0}")]
    SpanNotFound(String),
    #[error("channel not found: span {span} channel {channel}")]
    ChannelNotFound { span: u32, channel: u32 },
    #[error("driver not found: {0}")]
    DriverNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ZtError {
    pub fn status(&self) -> Status {
        match self {
            ZtError::Status { status, .. } => *status,
            _ => Status::Fail,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ZtError::Status {
            status: Status::Fail,
            message: truncate_last_error(message.into()),
        }
    }

    pub fn mem_err(message: impl Into<String>) -> Self {
        ZtError::Status {
            status: Status::MemErr,
            message: truncate_last_error(message.into()),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ZtError::Status {
            status: Status::Timeout,
            message: truncate_last_error(message.into()),
        }
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        ZtError::Status {
            status: Status::NotImplemented,
            message: truncate_last_error(what.into()),
        }
    }
}

/// Truncate a message to [`LAST_ERROR_LEN`] bytes on a char boundary.
pub fn truncate_last_error(mut msg: String) -> String {
    if msg.len() > LAST_ERROR_LEN {
        let mut end = LAST_ERROR_LEN;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        msg.truncate(end);
    }
    msg
}

/// A convenience Result type for channel-core operations.
pub type Result<T> = std::result::Result<T, ZtError>;
