// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU framing: unit id, PDU and a trailing CRC-16.

use bytes::{BufMut as _, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    checksum::crc16,
    error::FramingError,
    frame::{RequestMessage, ResponseMessage, MEI_TYPE_READ_DEVICE_IDENTIFICATION},
    Error, Result,
};

use super::{decode_request, decode_response, encode_request_adu_body, encode_response_adu_body};

// unit id + function code + crc
const MIN_ADU_LEN: usize = 1 + 1 + 2;

const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecType {
    Client,
    Server,
}

/// Splits complete, CRC-verified frames off the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameDecoder {
    codec_type: CodecType,
}

impl FrameDecoder {
    pub(crate) const fn client() -> Self {
        Self {
            codec_type: CodecType::Client,
        }
    }

    pub(crate) const fn server() -> Self {
        Self {
            codec_type: CodecType::Server,
        }
    }

    /// Returns the unit id and PDU of the next frame without the CRC.
    pub(crate) fn decode_frame(
        &self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Bytes>, FramingError> {
        let payload_len = match self.codec_type {
            CodecType::Client => response_payload_len(buf),
            CodecType::Server => request_payload_len(buf),
        }
        .map_err(|err| {
            log::warn!("Dropping {} buffered byte(s): {err}", buf.len());
            buf.clear();
            err
        })?
        .filter(|payload_len| buf.len() >= MIN_ADU_LEN + payload_len);
        let Some(payload_len) = payload_len else {
            // incomplete frame
            return Ok(None);
        };
        let adu_len = 2 + payload_len;
        let expected = crc16(&buf[..adu_len]);
        let actual = u16::from_be_bytes([buf[adu_len], buf[adu_len + 1]]);
        if expected != actual {
            log::warn!(
                "Dropping {} buffered byte(s) after CRC mismatch: expected = 0x{expected:04X}, actual = 0x{actual:04X}",
                buf.len()
            );
            buf.clear();
            return Err(FramingError::ChecksumMismatch { expected, actual });
        }
        let adu = buf.split_to(adu_len).freeze();
        let _ = buf.split_to(CRC_LEN);
        Ok(Some(adu))
    }
}

fn request_payload_len(buf: &[u8]) -> std::result::Result<Option<usize>, FramingError> {
    let Some(&fn_code) = buf.get(1) else {
        // incomplete frame
        return Ok(None);
    };
    let len = match fn_code {
        0x01..=0x06 | 0x08 => Some(4),
        0x07 | 0x0B | 0x0C | 0x11 => Some(0),
        0x0F | 0x10 => buf.get(6).map(|&byte_count| 5 + usize::from(byte_count)),
        0x14 | 0x15 => buf.get(2).map(|&byte_count| 1 + usize::from(byte_count)),
        0x16 => Some(6),
        0x17 => buf.get(10).map(|&byte_count| 9 + usize::from(byte_count)),
        0x18 => Some(2),
        0x2B => Some(3),
        fn_code => return Err(FramingError::UnsupportedFunction(fn_code)),
    };
    Ok(len)
}

fn response_payload_len(buf: &[u8]) -> std::result::Result<Option<usize>, FramingError> {
    let Some(&fn_code) = buf.get(1) else {
        // incomplete frame
        return Ok(None);
    };
    let len = match fn_code {
        0x80..=0xFF => Some(1),
        0x01..=0x04 | 0x0C | 0x11 | 0x14 | 0x15 | 0x17 => {
            buf.get(2).map(|&byte_count| 1 + usize::from(byte_count))
        }
        0x05 | 0x06 | 0x08 | 0x0B | 0x0F | 0x10 => Some(4),
        0x07 => Some(1),
        0x16 => Some(6),
        0x18 => (buf.len() > 3)
            .then(|| 2 + usize::from(u16::from_be_bytes([buf[2], buf[3]]))),
        0x2B => device_identification_payload_len(buf)?,
        fn_code => return Err(FramingError::UnsupportedFunction(fn_code)),
    };
    Ok(len)
}

/// Walks the object list of a device identification response.
fn device_identification_payload_len(
    buf: &[u8],
) -> std::result::Result<Option<usize>, FramingError> {
    if let Some(&mei_type) = buf.get(2) {
        if mei_type != MEI_TYPE_READ_DEVICE_IDENTIFICATION {
            return Err(FramingError::malformed(format!(
                "unsupported MEI type: 0x{mei_type:02X}"
            )));
        }
    }
    let Some(&object_count) = buf.get(7) else {
        return Ok(None);
    };
    let mut pos = 8;
    for _ in 0..object_count {
        let Some(&len) = buf.get(pos + 1) else {
            return Ok(None);
        };
        pos += 2 + usize::from(len);
    }
    // Unit id and function code are not part of the payload
    Ok(Some(pos - 2))
}

fn put_crc(buf: &mut BytesMut, start: usize) {
    let crc = crc16(&buf[start..]);
    buf.put_u16(crc);
}

/// Master side codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCodec {
    decoder: FrameDecoder,
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self {
            decoder: FrameDecoder::client(),
        }
    }
}

/// Slave side codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCodec {
    decoder: FrameDecoder,
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self {
            decoder: FrameDecoder::server(),
        }
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseMessage>> {
        let Some(adu) = self.decoder.decode_frame(buf)? else {
            return Ok(None);
        };
        Ok(Some(decode_response(adu, true)?))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestMessage>> {
        let Some(adu) = self.decoder.decode_frame(buf)? else {
            return Ok(None);
        };
        Ok(Some(decode_request(adu, true)?))
    }
}

impl Encoder<&RequestMessage> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, message: &RequestMessage, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        encode_request_adu_body(buf, message.header.unit_id, &message.body)?;
        put_crc(buf, start);
        Ok(())
    }
}

impl Encoder<&ResponseMessage> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, message: &ResponseMessage, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        encode_response_adu_body(buf, message.header.unit_id, &message.body)?;
        put_crc(buf, start);
        Ok(())
    }
}
