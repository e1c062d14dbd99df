// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line codecs, either RTU or ASCII.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    frame::{RequestMessage, ResponseMessage},
    Error, Result,
};

use super::{ascii, rtu};

/// Encoding of frames on a serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Binary frames terminated by a CRC-16.
    #[default]
    Rtu,
    /// Hex encoded frames with LRC between `':'` and `CR LF`.
    Ascii,
}

/// Master side codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCodec {
    Rtu(rtu::ClientCodec),
    Ascii(ascii::ClientCodec),
}

impl ClientCodec {
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Rtu => Self::Rtu(rtu::ClientCodec::default()),
            Encoding::Ascii => Self::Ascii(ascii::ClientCodec),
        }
    }

    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        match self {
            Self::Rtu(_) => Encoding::Rtu,
            Self::Ascii(_) => Encoding::Ascii,
        }
    }
}

/// Slave side codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCodec {
    Rtu(rtu::ServerCodec),
    Ascii(ascii::ServerCodec),
}

impl ServerCodec {
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Rtu => Self::Rtu(rtu::ServerCodec::default()),
            Encoding::Ascii => Self::Ascii(ascii::ServerCodec),
        }
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseMessage>> {
        match self {
            Self::Rtu(codec) => codec.decode(buf),
            Self::Ascii(codec) => codec.decode(buf),
        }
    }
}

impl Decoder for ServerCodec {
    type Item = RequestMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestMessage>> {
        match self {
            Self::Rtu(codec) => codec.decode(buf),
            Self::Ascii(codec) => codec.decode(buf),
        }
    }
}

impl Encoder<&RequestMessage> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, message: &RequestMessage, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::Rtu(codec) => codec.encode(message, buf),
            Self::Ascii(codec) => codec.encode(message, buf),
        }
    }
}

impl Encoder<&ResponseMessage> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, message: &ResponseMessage, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::Rtu(codec) => codec.encode(message, buf),
            Self::Ascii(codec) => codec.encode(message, buf),
        }
    }
}
