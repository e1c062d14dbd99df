// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus UDP server skeleton
//!
//! Responses are routed back to the peer that sent the request with the
//! same transaction id prefix. Concurrent requests of different peers that
//! share a prefix can't be told apart: the later peer wins and the
//! collision is logged.

use std::{
    collections::HashMap,
    future::Future,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    codec::{decode_request, encode_response, MAX_PDU_SIZE, MBAP_PREFIX_LEN},
    frame::{ExceptionCode, Response},
};

use super::{dispatch, Service, SlaveRequest, Terminated};

/// Capacity of the queues between the socket tasks and the application.
const QUEUE_CAPACITY: usize = 32;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MAX_STOP_POLLS: usize = 10;

// Transaction id and protocol id
const PREFIX_LEN: usize = 4;

/// MBAP header, unit id and the largest PDU.
const MAX_DATAGRAM_LEN: usize = MBAP_PREFIX_LEN + 1 + MAX_PDU_SIZE;

type Peers = Arc<Mutex<HashMap<u32, SocketAddr>>>;

fn lock_peers(peers: &Peers) -> MutexGuard<'_, HashMap<u32, SocketAddr>> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn prefix(datagram: &[u8]) -> Option<u32> {
    let prefix = datagram.get(..PREFIX_LEN)?;
    Some(u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))
}

fn inactive() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "UDP terminal is not active")
}

/// Slave side of a UDP socket.
///
/// A receiver task queues incoming datagrams and remembers their origin,
/// a sender task delivers queued responses to the remembered peers.
#[derive(Debug)]
pub struct UdpSlaveTerminal {
    local_addr: SocketAddr,
    active: Arc<AtomicBool>,
    peers: Peers,
    stop_signal: watch::Sender<bool>,
    incoming: mpsc::Receiver<Bytes>,
    outgoing: mpsc::Sender<Bytes>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpSlaveTerminal {
    /// Binds the socket and starts the background tasks.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        let peers = Peers::default();
        let (stop_signal, stop_rx) = watch::channel(false);
        let (incoming_tx, incoming) = mpsc::channel(QUEUE_CAPACITY);
        let (outgoing, outgoing_rx) = mpsc::channel(QUEUE_CAPACITY);

        let receiver = tokio::spawn(receive_datagrams(
            Arc::clone(&socket),
            Arc::clone(&peers),
            incoming_tx,
            stop_rx.clone(),
        ));
        let sender = tokio::spawn(send_datagrams(
            socket,
            Arc::clone(&peers),
            outgoing_rx,
            stop_rx,
        ));
        log::debug!("Activated UDP terminal on {local_addr}");

        Ok(Self {
            local_addr,
            active: Arc::new(AtomicBool::new(true)),
            peers,
            stop_signal,
            incoming,
            outgoing,
            tasks: vec![receiver, sender],
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Waits for the next request datagram.
    pub async fn receive(&mut self) -> io::Result<Bytes> {
        if !self.is_active() {
            return Err(inactive());
        }
        self.incoming.recv().await.ok_or_else(inactive)
    }

    /// Queues a response datagram for the peer of its transaction.
    pub async fn send(&self, datagram: Bytes) -> io::Result<()> {
        if !self.is_active() {
            return Err(inactive());
        }
        self.outgoing.send(datagram).await.map_err(|_| inactive())
    }

    /// Forgets the peer of a request datagram that won't be answered.
    pub fn forget(&self, request: &[u8]) {
        if let Some(key) = prefix(request) {
            lock_peers(&self.peers).remove(&key);
        }
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_peers(&self.peers).len()
    }

    /// Stops both tasks, aborting those that don't finish in time.
    pub async fn stop(&mut self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        // Receivers are only gone if the tasks have already finished.
        let _ = self.stop_signal.send(true);
        for _ in 0..MAX_STOP_POLLS {
            if self.tasks.iter().all(JoinHandle::is_finished) {
                break;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        for task in self.tasks.drain(..) {
            if !task.is_finished() {
                log::warn!("Aborting UDP terminal task");
                task.abort();
            }
        }
        log::debug!("Deactivated UDP terminal on {}", self.local_addr);
    }
}

impl Drop for UdpSlaveTerminal {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn receive_datagrams(
    socket: Arc<UdpSocket>,
    peers: Peers,
    incoming: mpsc::Sender<Bytes>,
    mut stop_signal: watch::Receiver<bool>,
) {
    // One spare byte reveals oversized datagrams.
    let mut buf = [0; MAX_DATAGRAM_LEN + 1];
    loop {
        let received = tokio::select! {
            received = socket.recv_from(&mut buf) => received,
            _ = stop_signal.changed() => break,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            Err(err) => {
                log::error!("Failed to receive datagram: {err}");
                break;
            }
        };
        if len > MAX_DATAGRAM_LEN {
            log::debug!("Skipping oversized datagram from {peer}");
            continue;
        }
        let datagram = Bytes::copy_from_slice(&buf[..len]);
        log::trace!("Received {:02X?} from {peer}", &datagram[..]);
        let Some(key) = prefix(&datagram) else {
            log::debug!("Skipping truncated datagram from {peer}");
            continue;
        };
        if let Some(previous) = lock_peers(&peers).insert(key, peer) {
            if previous != peer {
                log::warn!("Transaction 0x{key:08X} of {previous} is answered to {peer}");
            }
        }
        if incoming.send(datagram).await.is_err() {
            break;
        }
    }
    log::debug!("UDP receiver stopped");
}

async fn send_datagrams(
    socket: Arc<UdpSocket>,
    peers: Peers,
    mut outgoing: mpsc::Receiver<Bytes>,
    mut stop_signal: watch::Receiver<bool>,
) {
    loop {
        let datagram = tokio::select! {
            datagram = outgoing.recv() => datagram,
            _ = stop_signal.changed() => None,
        };
        let Some(datagram) = datagram else {
            break;
        };
        let Some(peer) = prefix(&datagram).and_then(|key| lock_peers(&peers).remove(&key)) else {
            log::warn!("Dropping response without a known peer");
            continue;
        };
        log::trace!("Sending {:02X?} to {peer}", &datagram[..]);
        if let Err(err) = socket.send_to(&datagram, peer).await {
            log::warn!("Failed to send datagram to {peer}: {err}");
        }
    }
    log::debug!("UDP sender stopped");
}

/// Answers MBAP requests received on a UDP socket.
#[derive(Debug)]
pub struct Server {
    terminal: UdpSlaveTerminal,
}

impl Server {
    #[must_use]
    pub const fn new(terminal: UdpSlaveTerminal) -> Self {
        Self { terminal }
    }

    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        UdpSlaveTerminal::bind(addr).await.map(Self::new)
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.terminal.local_addr()
    }

    /// Serve requests until the terminal fails.
    ///
    /// Datagrams that can't be decoded are skipped.
    pub async fn serve<S>(&mut self, service: &S) -> io::Result<()>
    where
        S: Service,
        S::Request: From<SlaveRequest>,
        S::Response: Into<Option<Response>>,
        S::Exception: Into<ExceptionCode>,
    {
        loop {
            let datagram = self.terminal.receive().await?;
            let request = match decode_request(datagram.clone(), false) {
                Ok(request) => request,
                Err(err) => {
                    log::debug!("Skipping invalid request: {err}");
                    self.terminal.forget(&datagram);
                    continue;
                }
            };
            let Some(response) = dispatch(service, request).await else {
                self.terminal.forget(&datagram);
                continue;
            };
            let mut reply = BytesMut::new();
            if let Err(err) = encode_response(&mut reply, &response) {
                log::error!("Failed to encode response: {err}");
                self.terminal.forget(&datagram);
                continue;
            }
            self.terminal.send(reply.freeze()).await?;
        }
    }

    /// Serve requests until `abort_signal` resolves, then stop the terminal.
    pub async fn serve_until<S, X>(mut self, service: S, abort_signal: X) -> io::Result<Terminated>
    where
        S: Service,
        S::Request: From<SlaveRequest>,
        S::Response: Into<Option<Response>>,
        S::Exception: Into<ExceptionCode>,
        X: Future<Output = ()> + Unpin,
    {
        let terminated = tokio::select! {
            res = self.serve(&service) => res.map(|()| Terminated::Finished),
            () = abort_signal => {
                log::debug!("Abort signal received");
                Ok(Terminated::Aborted)
            }
        };
        self.terminal.stop().await;
        terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio::sync::oneshot;

    use crate::{
        image::SimpleProcessImage,
        server::{ProcessorConfig, RequestProcessor},
    };

    async fn local_terminal() -> io::Result<UdpSlaveTerminal> {
        UdpSlaveTerminal::bind("127.0.0.1:0".parse().unwrap()).await
    }

    #[tokio::test]
    async fn response_is_routed_to_the_requesting_peer() -> anyhow::Result<()> {
        // Given
        let mut terminal = local_terminal().await?;
        let first = UdpSocket::bind("127.0.0.1:0").await?;
        let second = UdpSocket::bind("127.0.0.1:0").await?;

        // When
        first
            .send_to(&[0x00, 0x01, 0x00, 0x00, 0xAA], terminal.local_addr())
            .await?;
        second
            .send_to(&[0x00, 0x02, 0x00, 0x00, 0xBB], terminal.local_addr())
            .await?;
        let _ = terminal.receive().await?;
        let _ = terminal.receive().await?;
        terminal
            .send(Bytes::from_static(&[0x00, 0x02, 0x00, 0x00, 0x02]))
            .await?;
        terminal
            .send(Bytes::from_static(&[0x00, 0x01, 0x00, 0x00, 0x01]))
            .await?;

        // Then
        let mut buf = [0; 8];
        let len = first.recv(&mut buf).await?;
        assert_eq!(&buf[..len], &[0x00, 0x01, 0x00, 0x00, 0x01]);
        let len = second.recv(&mut buf).await?;
        assert_eq!(&buf[..len], &[0x00, 0x02, 0x00, 0x00, 0x02]);
        Ok(())
    }

    #[tokio::test]
    async fn stopped_terminal_is_inactive() -> anyhow::Result<()> {
        let mut terminal = local_terminal().await?;
        assert!(terminal.is_active());

        terminal.stop().await;

        assert!(!terminal.is_active());
        assert!(terminal.receive().await.is_err());
        assert!(terminal.send(Bytes::new()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn unanswered_requests_forget_their_peer() -> anyhow::Result<()> {
        // Given
        let image = SimpleProcessImage::with_sizes(0, 0, 0x10, 0);
        let config = ProcessorConfig::default().forgive_unknown_unit_id(true);
        let processor = RequestProcessor::new(config).with_image(3, Arc::new(image));
        let mut server = Server::bind("127.0.0.1:0".parse()?).await?;
        let addr = server.local_addr();
        let master = UdpSocket::bind("127.0.0.1:0").await?;

        // When
        let exchange = async {
            // Undecodable
            master.send_to(&[0x00, 0x09, 0x00, 0x00, 0xFF], addr).await?;
            // Unknown unit 9
            master
                .send_to(
                    &[0x00, 0x0A, 0x00, 0x00, 0x00, 0x06, 0x09, 0x04, 0x00, 0x00, 0x00, 0x01],
                    addr,
                )
                .await?;
            master
                .send_to(
                    &[0x00, 0x0B, 0x00, 0x00, 0x00, 0x06, 0x03, 0x04, 0x00, 0x00, 0x00, 0x01],
                    addr,
                )
                .await?;
            let mut buf = [0; 32];
            let len = master.recv(&mut buf).await?;
            Ok::<_, io::Error>(buf[..len].to_vec())
        };
        let response = tokio::select! {
            res = server.serve(&processor) => panic!("Server stopped: {res:?}"),
            response = exchange => response?,
        };

        // Then
        assert_eq!(&response[..2], &[0x00, 0x0B]);
        assert_eq!(server.terminal.pending(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_datagram_is_skipped() -> anyhow::Result<()> {
        let mut terminal = local_terminal().await?;
        let peer = UdpSocket::bind("127.0.0.1:0").await?;

        peer.send_to(&[0x00; MAX_DATAGRAM_LEN + 1], terminal.local_addr())
            .await?;
        peer.send_to(&[0x00; MAX_DATAGRAM_LEN], terminal.local_addr())
            .await?;

        assert_eq!(terminal.receive().await?.len(), MAX_DATAGRAM_LEN);
        assert_eq!(terminal.pending(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn serve_requests_until_aborted() -> anyhow::Result<()> {
        // Given
        let image = SimpleProcessImage::with_sizes(0, 0, 0x10, 0);
        image.set_input_registers(0x08, &[0x000A])?;
        let processor =
            RequestProcessor::new(ProcessorConfig::default()).with_image(3, Arc::new(image));
        let server = Server::bind("127.0.0.1:0".parse()?).await?;
        let addr = server.local_addr();
        let (abort_tx, abort_rx) = oneshot::channel::<()>();
        let abort_signal = Box::pin(async move {
            let _ = abort_rx.await;
        });
        let server = tokio::spawn(server.serve_until(processor, abort_signal));
        let master = UdpSocket::bind("127.0.0.1:0").await?;

        // When
        master
            .send_to(
                &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x03, 0x04, 0x00, 0x08, 0x00, 0x01],
                addr,
            )
            .await?;
        let mut buf = [0; 32];
        let len = master.recv(&mut buf).await?;
        abort_tx.send(()).unwrap();

        // Then
        assert_eq!(
            &buf[..len],
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0x03, 0x04, 0x02, 0x00, 0x0A]
        );
        assert_eq!(server.await??, Terminated::Aborted);
        Ok(())
    }
}
