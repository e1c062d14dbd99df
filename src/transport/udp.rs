// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UDP transport, one message with MBAP header per datagram.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;

use crate::{
    codec::{decode_response, encode_request},
    consts::{DEFAULT_PORT, DEFAULT_TIMEOUT},
    frame::{RequestMessage, ResponseMessage},
    Result,
};

use super::{with_timeout, Connection, Transport};

// MBAP header, unit id and the largest PDU with some slack
const RECEIVE_BUFFER_SIZE: usize = 262;

/// Parameters of a UDP master terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpConfig {
    pub addr: SocketAddr,

    /// Timeout for receiving a response.
    pub timeout: Option<Duration>,
}

impl UdpConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))
    }
}

fn inactive() -> crate::Error {
    io::Error::new(io::ErrorKind::NotConnected, "UDP terminal is not active").into()
}

/// Master terminal with a socket that is bound on activation.
#[derive(Debug)]
pub struct UdpTransport {
    config: UdpConfig,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    #[must_use]
    pub const fn new(config: UdpConfig) -> Self {
        Self {
            config,
            socket: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &UdpConfig {
        &self.config
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or_else(inactive)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn is_headless(&self) -> bool {
        false
    }

    async fn write_request(&mut self, request: &RequestMessage) -> Result<()> {
        let socket = self.socket()?;
        let mut datagram = BytesMut::new();
        encode_request(&mut datagram, request)?;
        log::debug!("Sending {:?} to {}", request.body, request.header.unit_id);
        log::trace!("Sending {:02X?}", &datagram[..]);
        socket.send(&datagram).await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<ResponseMessage> {
        let socket = self.socket()?;
        let mut buf = [0; RECEIVE_BUFFER_SIZE];
        let len = with_timeout(self.config.timeout, async {
            Ok(socket.recv(&mut buf).await?)
        })
        .await?;
        log::trace!("Received {:02X?}", &buf[..len]);
        let response = decode_response(Bytes::copy_from_slice(&buf[..len]), false)?;
        log::debug!("Received {:?}", response.body);
        Ok(response)
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.socket.take().is_some() {
            log::debug!("Deactivated terminal for {}", self.config.addr);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for UdpTransport {
    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let local_addr = if self.config.addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(self.config.addr).await?;
        log::debug!("Activated terminal for {}", self.config.addr);
        self.socket = Some(socket);
        Ok(())
    }
}
