// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server skeleton

use std::{future::Future, io, net::SocketAddr};

use futures_util::{SinkExt as _, StreamExt as _};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::codec::Framed;

use crate::{
    codec::tcp::ServerCodec,
    frame::{ExceptionCode, Response},
    Error,
};

use super::{dispatch, Service, SlaveRequest, Terminated};

/// Backlog of pending connections of [`Server::bind()`].
const LISTEN_BACKLOG: i32 = 1024;

/// Accepts connections and serves requests on each of them.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    headless: bool,
}

impl Server {
    /// Attach the Modbus server to a TCP socket server.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            headless: false,
        }
    }

    /// Binds a listening socket to `addr`.
    ///
    /// The socket reuses the address and disables Nagle's algorithm.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self::new(listener(addr)?))
    }

    /// Serve RTU frames instead of MBAP messages.
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listens for incoming connections and starts a Modbus TCP server task for
    /// each connection.
    ///
    /// `OnConnected` is responsible for creating both the service and the
    /// transport layer for the underlying TCP stream. If `OnConnected` returns
    /// with `Err` then listening stops and [`Self::serve()`] returns with an error.
    /// If `OnConnected` returns `Ok(None)` then the connection is rejected
    /// but [`Self::serve()`] continues listening for new connections.
    ///
    /// All connection tasks are aborted when the returned future is dropped.
    pub async fn serve<S, T, F, OnConnected, OnProcessError>(
        &self,
        on_connected: &OnConnected,
        on_process_error: OnProcessError,
    ) -> io::Result<()>
    where
        S: Service + Send + Sync + 'static,
        S::Request: From<SlaveRequest> + Send,
        S::Response: Into<Option<Response>> + Send,
        S::Exception: Into<ExceptionCode> + Send,
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        OnConnected: Fn(TcpStream, SocketAddr) -> F,
        F: Future<Output = io::Result<Option<(S, T)>>>,
        OnProcessError: FnOnce(Error) + Clone + Send + 'static,
    {
        let mut connections = JoinSet::new();
        loop {
            let (stream, socket_addr) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                Some(_) = connections.join_next() => continue,
            };
            log::debug!("Accepted connection from {socket_addr}");

            let Some((service, transport)) = on_connected(stream, socket_addr).await? else {
                log::debug!("No service for connection from {socket_addr}");
                continue;
            };
            let on_process_error = on_process_error.clone();
            let framed = Framed::new(transport, ServerCodec::new(self.headless));

            connections.spawn(async move {
                log::debug!("Processing requests from {socket_addr}");
                if let Err(err) = process(framed, service).await {
                    on_process_error(err);
                }
            });
        }
    }

    /// Start an abortable Modbus TCP server task.
    ///
    /// Warning: Request processing is not scoped and could be aborted at any internal await point!
    /// See also: <https://rust-lang.github.io/wg-async/vision/roadmap/scopes.html#cancellation>
    pub async fn serve_until<S, T, F, X, OnConnected, OnProcessError>(
        self,
        on_connected: &OnConnected,
        on_process_error: OnProcessError,
        abort_signal: X,
    ) -> io::Result<Terminated>
    where
        S: Service + Send + Sync + 'static,
        S::Request: From<SlaveRequest> + Send,
        S::Response: Into<Option<Response>> + Send,
        S::Exception: Into<ExceptionCode> + Send,
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        X: Future<Output = ()> + Send + Unpin,
        OnConnected: Fn(TcpStream, SocketAddr) -> F,
        F: Future<Output = io::Result<Option<(S, T)>>>,
        OnProcessError: FnOnce(Error) + Clone + Send + 'static,
    {
        tokio::select! {
            res = self.serve(on_connected, on_process_error) => res.map(|()| Terminated::Finished),
            () = abort_signal => {
                log::debug!("Abort signal received");
                Ok(Terminated::Aborted)
            }
        }
    }
}

/// Creates the service for an accepted connection.
///
/// `new_service` may reject the connection by returning `Ok(None)`.
pub fn accept_tcp_connection<S, NewService>(
    stream: TcpStream,
    socket_addr: SocketAddr,
    new_service: NewService,
) -> io::Result<Option<(S, TcpStream)>>
where
    S: Service + Send + Sync + 'static,
    NewService: Fn(SocketAddr) -> io::Result<Option<S>>,
{
    let service = new_service(socket_addr)?;
    Ok(service.map(|service| (service, stream)))
}

/// The request-response loop spawned by [`Server::serve()`] for each connection.
async fn process<S, T>(mut framed: Framed<T, ServerCodec>, service: S) -> Result<(), Error>
where
    S: Service + Send + Sync + 'static,
    S::Request: From<SlaveRequest> + Send,
    S::Response: Into<Option<Response>> + Send,
    S::Exception: Into<ExceptionCode> + Send,
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(request) = framed.next().await.transpose()? else {
            log::debug!("TCP socket has been closed");
            break;
        };
        let Some(response) = dispatch(&service, request).await else {
            continue;
        };
        framed.send(&response).await?;
    }
    Ok(())
}

/// Start TCP listener - configure and open TCP socket
fn listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}
