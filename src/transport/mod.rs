// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moving messages over a physical medium.
//!
//! A [`Transport`] writes one request and reads one response. Transports
//! that maintain a connection or socket implement [`Connection`] to let
//! the transaction executors (re-)establish it lazily.

use std::{fmt, future::Future, io, time::Duration};

use async_trait::async_trait;

use crate::{
    error::timed_out,
    frame::{RequestMessage, ResponseMessage},
    Result,
};

pub mod serial;
pub mod tcp;
pub mod udp;

pub use self::{
    serial::{Parity, SerialConfig, SerialTransport},
    tcp::{TcpConfig, TcpTransport},
    udp::{UdpConfig, UdpTransport},
};

/// Master side of a medium.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Messages travel without transaction and protocol identifiers.
    fn is_headless(&self) -> bool;

    /// Encodes and sends a request.
    async fn write_request(&mut self, request: &RequestMessage) -> Result<()>;

    /// Waits for the next complete response.
    async fn read_response(&mut self) -> Result<ResponseMessage>;

    /// Releases the underlying stream or socket.
    async fn close(&mut self) -> io::Result<()>;
}

/// A transport that needs to be connected before use.
#[async_trait]
pub trait Connection: Transport {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<()>;
}

/// Awaits `future`, failing with [`io::ErrorKind::TimedOut`] after `timeout`.
pub(crate) async fn with_timeout<F, T>(timeout: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| timed_out())?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Error;

    #[tokio::test]
    async fn timeout_yields_timed_out_error() {
        let err = with_timeout(
            Some(Duration::from_millis(1)),
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transport(err) if err.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn no_timeout_awaits_completion() {
        let value = with_timeout(None, async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
