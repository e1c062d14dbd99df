// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII framing: `':'`, hex encoded unit id, PDU and LRC, then `CR LF`.

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    checksum::lrc,
    frame::{RequestMessage, ResponseMessage},
    Error, Result,
};

use super::{
    decode_request, decode_response, encode_request_adu_body, encode_response_adu_body,
    MAX_PDU_SIZE,
};

const FRAME_START: u8 = b':';
const CR: u8 = b'\r';
const LF: u8 = b'\n';

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

// ':' + hex(unit id + PDU + LRC) + CR LF
const MAX_FRAME_LEN: usize = 1 + 2 * (1 + MAX_PDU_SIZE + 1) + 2;

// unit id + function code + LRC
const MIN_FRAME_DATA_LEN: usize = 3;

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn decode_hex(hex: &[u8]) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chunks_exact(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn put_hex(buf: &mut BytesMut, byte: u8) {
    buf.put_u8(HEX_DIGITS[usize::from(byte >> 4)]);
    buf.put_u8(HEX_DIGITS[usize::from(byte & 0x0F)]);
}

fn is_line_end(byte: u8) -> bool {
    byte == CR || byte == LF
}

/// Drops the first `count` bytes of `buf`, logging everything that
/// is not a line end.
fn skip_garbage(buf: &mut BytesMut, count: usize) {
    let garbage = buf[..count].iter().filter(|b| !is_line_end(**b)).count();
    if garbage > 0 {
        log::debug!("Skipping {garbage} garbage byte(s) before frame start");
    }
    buf.advance(count);
}

/// Splits the next frame with a valid LRC off the receive buffer.
///
/// Invalid frames are skipped and scanning resumes at the next frame start.
/// Returns the unit id and PDU without the LRC.
pub(crate) fn decode_frame(buf: &mut BytesMut) -> Option<Bytes> {
    loop {
        let Some(start) = buf.iter().position(|b| *b == FRAME_START) else {
            let len = buf.len();
            skip_garbage(buf, len);
            return None;
        };
        skip_garbage(buf, start);

        let next = buf
            .iter()
            .skip(1)
            .position(|b| *b == FRAME_START || is_line_end(*b))
            .map(|i| i + 1);
        let end = match next {
            Some(i) if buf[i] == FRAME_START => {
                log::debug!("Restarting incomplete frame after {i} byte(s)");
                buf.advance(i);
                continue;
            }
            Some(end) => end,
            None => {
                if buf.len() > MAX_FRAME_LEN {
                    log::warn!("Dropping unterminated frame of {} byte(s)", buf.len());
                    buf.advance(1);
                    continue;
                }
                // incomplete frame
                return None;
            }
        };

        let frame = buf.split_to(end);
        let Some(data) = decode_hex(&frame[1..]) else {
            log::debug!("Skipping frame with invalid hex encoding");
            continue;
        };
        if data.len() < MIN_FRAME_DATA_LEN {
            log::debug!("Skipping short frame of {} byte(s)", data.len());
            continue;
        }
        let (adu, checksum) = data.split_at(data.len() - 1);
        let expected = lrc(adu, 0);
        if expected != checksum[0] {
            log::warn!(
                "Skipping frame after LRC mismatch: expected = 0x{expected:02X}, actual = 0x{:02X}",
                checksum[0]
            );
            continue;
        }
        return Some(Bytes::copy_from_slice(adu));
    }
}

/// Hex encodes a raw ADU including its LRC.
fn put_frame(buf: &mut BytesMut, adu: &[u8]) {
    buf.reserve(1 + 2 * (adu.len() + 1) + 2);
    buf.put_u8(FRAME_START);
    for byte in adu {
        put_hex(buf, *byte);
    }
    put_hex(buf, lrc(adu, 0));
    buf.put_u8(CR);
    buf.put_u8(LF);
}

/// Master side codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCodec;

/// Slave side codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCodec;

impl Decoder for ClientCodec {
    type Item = ResponseMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseMessage>> {
        let Some(adu) = decode_frame(buf) else {
            return Ok(None);
        };
        Ok(Some(decode_response(adu, true)?))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestMessage>> {
        let Some(adu) = decode_frame(buf) else {
            return Ok(None);
        };
        Ok(Some(decode_request(adu, true)?))
    }
}

impl Encoder<&RequestMessage> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, message: &RequestMessage, buf: &mut BytesMut) -> Result<()> {
        let mut adu = BytesMut::new();
        encode_request_adu_body(&mut adu, message.header.unit_id, &message.body)?;
        put_frame(buf, &adu);
        Ok(())
    }
}

impl Encoder<&ResponseMessage> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, message: &ResponseMessage, buf: &mut BytesMut) -> Result<()> {
        let mut adu = BytesMut::new();
        encode_response_adu_body(&mut adu, message.header.unit_id, &message.body)?;
        put_frame(buf, &adu);
        Ok(())
    }
}
