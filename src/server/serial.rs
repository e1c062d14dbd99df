// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU and ASCII server skeleton

use std::{fmt, future::Future};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    codec::serial::ServerCodec,
    frame::{ExceptionCode, Response},
    transport::{SerialConfig, SerialTransport},
    unit::Unit,
    Error, Result,
};

use super::{dispatch, Service, SlaveRequest, Terminated};

/// Serves requests on a serial line.
#[derive(Debug)]
pub struct Server<T> {
    transport: SerialTransport<T, ServerCodec>,
}

impl<T> Server<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug,
{
    /// Serves the line `io` with the encoding of `config`.
    ///
    /// Requests are awaited without a timeout.
    pub fn new(io: T, config: SerialConfig) -> Self {
        let config = config.timeout(None);
        let codec = ServerCodec::new(config.encoding);
        Self {
            transport: SerialTransport::new(io, codec, config),
        }
    }

    /// Serve requests until the line is closed or fails.
    pub async fn serve_forever<S>(mut self, service: S) -> Result<()>
    where
        S: Service,
        S::Request: From<SlaveRequest>,
        S::Response: Into<Option<Response>>,
        S::Exception: Into<ExceptionCode>,
    {
        process(&mut self.transport, &service).await
    }

    /// Serve requests until the line is closed or `abort_signal` resolves.
    pub async fn serve_until<S, X>(mut self, service: S, abort_signal: X) -> Result<Terminated>
    where
        S: Service,
        S::Request: From<SlaveRequest>,
        S::Response: Into<Option<Response>>,
        S::Exception: Into<ExceptionCode>,
        X: Future<Output = ()> + Unpin,
    {
        tokio::select! {
            res = process(&mut self.transport, &service) => res.map(|()| Terminated::Finished),
            () = abort_signal => {
                log::debug!("Abort signal received");
                Ok(Terminated::Aborted)
            }
        }
    }
}

/// Serve requests on `io` until the line is closed or fails.
pub async fn serve<T, S>(io: T, config: SerialConfig, service: S) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug,
    S: Service,
    S::Request: From<SlaveRequest>,
    S::Response: Into<Option<Response>>,
    S::Exception: Into<ExceptionCode>,
{
    Server::new(io, config).serve_forever(service).await
}

async fn process<T, S>(transport: &mut SerialTransport<T, ServerCodec>, service: &S) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: Service,
    S::Request: From<SlaveRequest>,
    S::Response: Into<Option<Response>>,
    S::Exception: Into<ExceptionCode>,
{
    loop {
        let request = match transport.read_frame().await {
            Ok(request) => request,
            Err(Error::Framing(err)) => {
                log::debug!("Skipping invalid request: {err}");
                transport.discard().await;
                continue;
            }
            Err(Error::Transport(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("Serial line has been closed");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        transport.stamp();
        let broadcast = Unit(request.header.unit_id).is_broadcast();
        let Some(response) = dispatch(service, request).await else {
            continue;
        };
        if broadcast {
            log::debug!("Broadcast request executed without response");
            continue;
        }
        transport.wait_between_frames().await;
        transport.write_frame(&response).await?;
        transport.stamp();
    }
}
