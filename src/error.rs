// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::frame::{ExceptionResponse, FunctionCode};

/// A frame could not be delimited or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The checksum of a received frame doesn't match its contents.
    #[error("checksum mismatch: expected 0x{expected:04X}, actual 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// The length announced in the header doesn't match the decoded payload.
    #[error("length mismatch: announced {announced}, decoded {decoded}")]
    LengthMismatch { announced: usize, decoded: usize },

    /// The frame exceeds the maximum message length.
    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    /// Frame boundaries can't be determined for this function code.
    #[error("unsupported function code: 0x{0:02X}")]
    UnsupportedFunction(u8),

    /// The MBAP header carries a foreign protocol identifier.
    #[error("invalid protocol id: 0x{0:04X}")]
    InvalidProtocolId(u16),

    /// The payload violates the layout of its function code.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl FramingError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// A decoded response doesn't belong to the request that has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The peer answered with another transaction identifier.
    #[error("transaction id mismatch: expected {expected}, actual {actual}")]
    TransactionId { expected: u16, actual: u16 },

    /// The peer answered with another function code.
    #[error("function code mismatch: expected {expected}, actual {actual}")]
    FunctionCode {
        expected: FunctionCode,
        actual: FunctionCode,
    },

    /// No response has been received.
    #[error("missing response")]
    MissingResponse,
}

/// _Modbus_ protocol engine error.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying byte stream or socket failed, including timeouts.
    #[error(transparent)]
    Transport(#[from] io::Error),

    /// A frame could not be delimited or decoded.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The peer rejected the request with an exception response.
    #[error("exception: {0}")]
    Exception(ExceptionResponse),

    /// The response doesn't match the request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// All attempts of a transaction failed.
    #[error("giving up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },
}

impl Error {
    /// Whether the executors may repeat the exchange after this error.
    ///
    /// Exceptions are answers of the peer and are never repeated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Framing(_) | Self::Validation(_) => true,
            Self::Exception(_) | Self::RetriesExhausted { .. } => false,
        }
    }

    /// The exception response of the peer, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&ExceptionResponse> {
        match self {
            Self::Exception(exception) => Some(exception),
            Self::RetriesExhausted { last, .. } => last.exception(),
            _ => None,
        }
    }
}

impl From<ExceptionResponse> for Error {
    fn from(from: ExceptionResponse) -> Self {
        Self::Exception(from)
    }
}

impl From<Error> for io::Error {
    fn from(from: Error) -> Self {
        match from {
            Error::Transport(err) => err,
            Error::Exception(exception) => io::Error::new(io::ErrorKind::Other, exception),
            Error::Framing(err) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::Validation(err) => io::Error::new(io::ErrorKind::InvalidData, err),
            err @ Error::RetriesExhausted { .. } => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}

pub(crate) fn timed_out() -> Error {
    io::Error::new(io::ErrorKind::TimedOut, "no response within timeout").into()
}

pub(crate) fn broken_pipe() -> Error {
    io::Error::from(io::ErrorKind::BrokenPipe).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ExceptionCode;

    #[test]
    fn exceptions_are_not_retryable() {
        let err = Error::from(ExceptionResponse {
            function: FunctionCode::ReadCoils,
            exception: ExceptionCode::IllegalDataAddress,
        });
        assert!(!err.is_retryable());
        assert!(err.exception().is_some());
    }

    #[test]
    fn transport_and_validation_errors_are_retryable() {
        assert!(Error::from(io::Error::from(io::ErrorKind::TimedOut)).is_retryable());
        assert!(Error::from(ValidationError::MissingResponse).is_retryable());
        assert!(Error::from(FramingError::ChecksumMismatch {
            expected: 1,
            actual: 2
        })
        .is_retryable());
    }

    #[test]
    fn exhausted_retries_expose_the_last_exception() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(timed_out()),
        };
        assert!(!err.is_retryable());
        assert!(err.exception().is_none());
        assert_eq!(
            io::Error::from(err).kind(),
            io::ErrorKind::Other,
        );
    }
}
