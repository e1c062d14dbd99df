// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line transport for RTU and ASCII frames.
//!
//! Any byte stream can be used, e.g. a `tokio_serial::SerialStream`, a
//! socket of a serial gateway or an in-memory pipe.

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
    time::Instant,
};
use tokio_util::codec::{Decoder, Encoder};

pub use crate::codec::serial::Encoding;
use crate::{
    codec::serial::ClientCodec,
    consts::{DEFAULT_TIMEOUT, INTER_MESSAGE_GAP, MAX_MESSAGE_LENGTH, MINIMUM_TRANSMIT_DELAY},
    frame::{RequestMessage, ResponseMessage},
    Error, FramingError, Result,
};

use super::{with_timeout, Transport};

// Bounds draining a line that keeps on delivering data.
const MAX_DISCARD_READS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Line parameters of a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub encoding: Encoding,

    /// The line reflects every transmitted byte, e.g. a RS-485 adapter
    /// without echo suppression.
    pub echo: bool,

    /// Timeout for receiving the next chunk of a frame, `None` waits forever.
    pub timeout: Option<Duration>,

    /// Fixed silent interval before every frame. Zero derives the interval
    /// from the baud rate.
    pub transmit_delay: Duration,
}

impl SerialConfig {
    #[must_use]
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::Even,
            encoding: Encoding::Rtu,
            echo: false,
            timeout: Some(DEFAULT_TIMEOUT),
            transmit_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn transmit_delay(mut self, transmit_delay: Duration) -> Self {
        self.transmit_delay = transmit_delay;
        self
    }

    /// Silent interval required between two frames.
    ///
    /// 3.5 character times at the configured baud rate, but at least
    /// [`MINIMUM_TRANSMIT_DELAY`]. A non-zero `transmit_delay` overrides
    /// the computed value.
    #[must_use]
    pub fn inter_frame_delay(&self) -> Duration {
        if !self.transmit_delay.is_zero() {
            return self.transmit_delay;
        }
        let bits_per_char = f64::from(self.data_bits) + f64::from(self.stop_bits);
        let gap = INTER_MESSAGE_GAP * bits_per_char / f64::from(self.baud_rate.max(1));
        Duration::from_secs_f64(gap).max(MINIMUM_TRANSMIT_DELAY)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new(19_200)
    }
}

/// Opens a native serial port with the given line parameters.
#[cfg(feature = "serial-port")]
pub fn open_port(path: &str, config: &SerialConfig) -> io::Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt as _;

    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let stop_bits = if config.stop_bits > 1 {
        tokio_serial::StopBits::Two
    } else {
        tokio_serial::StopBits::One
    };
    let parity = match config.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    };
    let port = tokio_serial::new(path, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .open_native_async()?;
    Ok(port)
}

/// Frames on top of a serial byte stream.
///
/// `C` is the client or server codec of the line.
#[derive(Debug)]
pub struct SerialTransport<T, C> {
    io: T,
    codec: C,
    read_buf: BytesMut,
    config: SerialConfig,
    last_transaction: Option<Instant>,
}

impl<T, C> SerialTransport<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, codec: C, config: SerialConfig) -> Self {
        Self {
            io,
            codec,
            read_buf: BytesMut::with_capacity(MAX_MESSAGE_LENGTH),
            config,
            last_transaction: None,
        }
    }

    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    async fn fill_buf(&mut self) -> Result<usize> {
        let timeout = self.config.timeout;
        let Self { io, read_buf, .. } = self;
        read_buf.reserve(MAX_MESSAGE_LENGTH);
        let count = with_timeout(timeout, async {
            Ok(io.read_buf(read_buf).await?)
        })
        .await?;
        if count == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        log::trace!("Received {count} byte(s)");
        Ok(count)
    }

    pub async fn read_byte(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1).await?;
        Ok(bytes[0])
    }

    /// Reads exactly `count` bytes.
    pub async fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
        while self.read_buf.len() < count {
            self.fill_buf().await?;
        }
        Ok(self.read_buf.split_to(count).freeze())
    }

    /// Drops everything buffered and whatever the line delivers immediately.
    pub async fn discard(&mut self) {
        let mut discarded = self.read_buf.len();
        self.read_buf.clear();
        let mut scratch = [0; MAX_MESSAGE_LENGTH];
        for _ in 0..MAX_DISCARD_READS {
            match tokio::time::timeout(Duration::ZERO, self.io.read(&mut scratch)).await {
                Ok(Ok(count)) if count > 0 => discarded += count,
                _ => break,
            }
        }
        if discarded > 0 {
            log::debug!("Discarded {discarded} pending byte(s)");
        }
    }

    #[must_use]
    pub fn inter_frame_delay(&self) -> Duration {
        self.config.inter_frame_delay()
    }

    /// Keeps the line silent for the inter-frame delay.
    ///
    /// Time already passed since the last transaction counts towards the
    /// computed delay. A fixed transmit delay is always awaited in full.
    pub async fn wait_between_frames(&mut self) {
        let delay = self.inter_frame_delay();
        if !self.config.transmit_delay.is_zero() {
            tokio::time::sleep(delay).await;
            return;
        }
        let Some(last_transaction) = self.last_transaction else {
            return;
        };
        if let Some(remaining) = delay.checked_sub(last_transaction.elapsed()) {
            tokio::time::sleep(remaining).await;
        }
    }

    /// Records the end of an exchange.
    pub fn stamp(&mut self) {
        self.last_transaction = Some(Instant::now());
    }

    pub(crate) async fn write_frame<I>(&mut self, item: I) -> Result<()>
    where
        C: Encoder<I, Error = Error>,
    {
        self.discard().await;
        let mut frame = BytesMut::new();
        self.codec.encode(item, &mut frame)?;
        log::trace!("Sending {:02X?}", &frame[..]);
        self.io.write_all(&frame).await?;
        self.io.flush().await?;
        if self.config.echo {
            let echo = self.read_bytes(frame.len()).await?;
            if echo[..] != frame[..] {
                log::warn!(
                    "Echo mismatch: sent {:02X?}, received {:02X?}",
                    &frame[..],
                    &echo[..]
                );
            }
        }
        Ok(())
    }

    pub(crate) async fn read_frame(&mut self) -> Result<C::Item>
    where
        C: Decoder<Error = Error>,
    {
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(item)) => return Ok(item),
                Ok(None) => {}
                Err(err @ Error::Framing(FramingError::ChecksumMismatch { .. })) => {
                    self.discard().await;
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
            self.fill_buf().await?;
        }
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }
}

impl<T> SerialTransport<T, ClientCodec>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Master side transport with the codec selected by `config.encoding`.
    pub fn client(io: T, config: SerialConfig) -> Self {
        Self::new(io, ClientCodec::new(config.encoding), config)
    }
}

#[async_trait]
impl<T> Transport for SerialTransport<T, ClientCodec>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug,
{
    fn is_headless(&self) -> bool {
        true
    }

    async fn write_request(&mut self, request: &RequestMessage) -> Result<()> {
        log::debug!("Sending {:?} to {}", request.body, request.header.unit_id);
        self.write_frame(request).await
    }

    async fn read_response(&mut self) -> Result<ResponseMessage> {
        let response = self.read_frame().await?;
        log::debug!("Received {:?}", response.body);
        Ok(response)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}
