// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP transport, either with MBAP header or headless (RTU over TCP).

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::{io::AsyncWriteExt as _, net::TcpStream};
use tokio_util::codec::Framed;

use crate::{
    codec::tcp::ClientCodec,
    consts::{DEFAULT_PORT, DEFAULT_TIMEOUT},
    error::broken_pipe,
    frame::{RequestMessage, ResponseMessage},
    Result,
};

use super::{with_timeout, Connection, Transport};

/// Connection parameters of a TCP master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpConfig {
    pub addr: SocketAddr,

    /// Frames carry a CRC instead of the MBAP header (RTU over TCP).
    pub headless: bool,

    /// Applies to connecting and to waiting for a response.
    pub timeout: Option<Duration>,
}

impl TcpConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            headless: false,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))
    }
}

fn not_connected() -> crate::Error {
    io::Error::new(io::ErrorKind::NotConnected, "TCP transport is not connected").into()
}

/// A lazily connected TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    framed: Option<Framed<TcpStream, ClientCodec>>,
}

impl TcpTransport {
    #[must_use]
    pub const fn new(config: TcpConfig) -> Self {
        Self {
            config,
            framed: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn framed_mut(&mut self) -> Result<&mut Framed<TcpStream, ClientCodec>> {
        self.framed.as_mut().ok_or_else(not_connected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn is_headless(&self) -> bool {
        self.config.headless
    }

    async fn write_request(&mut self, request: &RequestMessage) -> Result<()> {
        let framed = self.framed_mut()?;
        // Leftovers of a previous exchange must not be taken as the response
        framed.read_buffer_mut().clear();
        log::debug!("Sending {:?} to {}", request.body, request.header.unit_id);
        framed.send(request).await
    }

    async fn read_response(&mut self) -> Result<ResponseMessage> {
        let timeout = self.config.timeout;
        let framed = self.framed_mut()?;
        let response = with_timeout(timeout, async {
            match framed.next().await {
                Some(response) => response,
                None => Err(broken_pipe()),
            }
        })
        .await?;
        log::debug!("Received {:?}", response.body);
        Ok(response)
    }

    async fn close(&mut self) -> io::Result<()> {
        let Some(mut framed) = self.framed.take() else {
            return Ok(());
        };
        log::debug!("Closing connection to {}", self.config.addr);
        framed.get_mut().shutdown().await
    }
}

#[async_trait]
impl Connection for TcpTransport {
    fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let addr = self.config.addr;
        log::debug!("Connecting to {addr}");
        let stream = with_timeout(self.config.timeout, async {
            Ok(TcpStream::connect(addr).await?)
        })
        .await?;
        stream.set_nodelay(true)?;
        self.framed = Some(Framed::new(stream, ClientCodec::new(self.config.headless)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::{io::AsyncReadExt as _, net::TcpListener};

    use crate::{bits::BitVector, frame::*, Error};

    #[tokio::test]
    async fn exchange_with_peer() -> anyhow::Result<()> {
        // Given
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let config = TcpConfig::new(listener.local_addr()?);
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            let mut request = [0; 12];
            stream.read_exact(&mut request).await?;
            stream
                .write_all(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x05])
                .await?;
            Ok::<_, io::Error>(request)
        });

        // When
        let mut transport = TcpTransport::new(config);
        assert!(!transport.is_connected());
        transport.connect().await?;
        let request = RequestMessage::new(Header::new(7, 1), Request::ReadCoils(0, 3));
        transport.write_request(&request).await?;
        let response = transport.read_response().await?;

        // Then
        assert_eq!(
            peer.await??,
            [0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
        assert_eq!(response.header, Header::new(7, 1));
        assert_eq!(
            response.body,
            ResponsePdu(Ok(Response::ReadCoils(BitVector::from_bytes(&[0x05]))))
        );
        transport.close().await?;
        assert!(!transport.is_connected());
        Ok(())
    }

    #[tokio::test]
    async fn silent_peer_times_out() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let config =
            TcpConfig::new(listener.local_addr()?).timeout(Some(Duration::from_millis(20)));
        let _peer = tokio::spawn(async move { listener.accept().await });

        let mut transport = TcpTransport::new(config);
        transport.connect().await?;
        let err = transport.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Transport(err) if err.kind() == io::ErrorKind::TimedOut));
        Ok(())
    }

    #[tokio::test]
    async fn writing_requires_connection() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        let request = RequestMessage::new(Header::new(1, 1), Request::ReadCoils(0, 1));
        let err = transport.write_request(&request).await.unwrap_err();
        assert!(matches!(err, Error::Transport(err) if err.kind() == io::ErrorKind::NotConnected));
    }
}
