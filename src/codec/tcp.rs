// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream framing with MBAP header, optionally headless (RTU over TCP).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::FramingError,
    frame::{RequestMessage, ResponseMessage},
    Error, Result,
};

use super::{
    decode_request, decode_response, encode_mbap_prefix, encode_request_adu_body,
    encode_response_adu_body, rtu, MAX_PDU_SIZE, MBAP_PREFIX_LEN,
};

// unit id + function code
const MIN_DATA_LENGTH: usize = 2;

// unit id + PDU
const MAX_DATA_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Splits the next complete MBAP frame off the stream buffer.
fn split_frame(buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, FramingError> {
    if buf.len() < MBAP_PREFIX_LEN {
        return Ok(None);
    }
    let data_length = usize::from(u16::from_be_bytes([buf[4], buf[5]]));
    if data_length < MIN_DATA_LENGTH {
        buf.clear();
        return Err(FramingError::malformed(format!(
            "invalid length field: {data_length}"
        )));
    }
    if data_length > MAX_DATA_LENGTH {
        buf.clear();
        return Err(FramingError::MessageTooLong(data_length));
    }
    let frame_len = MBAP_PREFIX_LEN + data_length;
    if buf.len() < frame_len {
        buf.reserve(frame_len - buf.len());
        return Ok(None);
    }
    Ok(Some(buf.split_to(frame_len).freeze()))
}

/// Master side codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCodec {
    headless: bool,
    rtu: rtu::ClientCodec,
}

impl ClientCodec {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            rtu: rtu::ClientCodec::default(),
        }
    }

    #[must_use]
    pub const fn is_headless(&self) -> bool {
        self.headless
    }
}

/// Slave side codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCodec {
    headless: bool,
    rtu: rtu::ServerCodec,
}

impl ServerCodec {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            rtu: rtu::ServerCodec::default(),
        }
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseMessage>> {
        if self.headless {
            return self.rtu.decode(buf);
        }
        let Some(frame) = split_frame(buf)? else {
            return Ok(None);
        };
        Ok(Some(decode_response(frame, false)?))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestMessage;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestMessage>> {
        if self.headless {
            return self.rtu.decode(buf);
        }
        let Some(frame) = split_frame(buf)? else {
            return Ok(None);
        };
        Ok(Some(decode_request(frame, false)?))
    }
}

impl Encoder<&RequestMessage> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, message: &RequestMessage, buf: &mut BytesMut) -> Result<()> {
        if self.headless {
            return self.rtu.encode(message, buf);
        }
        encode_mbap_prefix(buf, &message.header, message.data_length());
        encode_request_adu_body(buf, message.header.unit_id, &message.body)?;
        Ok(())
    }
}

impl Encoder<&ResponseMessage> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, message: &ResponseMessage, buf: &mut BytesMut) -> Result<()> {
        if self.headless {
            return self.rtu.encode(message, buf);
        }
        encode_mbap_prefix(buf, &message.header, message.data_length());
        encode_response_adu_body(buf, message.header.unit_id, &message.body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::frame::*;

    mod client {
        use super::*;

        #[test]
        fn decode_header_fragment() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(&[0x00, 0x11, 0x00, 0x00, 0x00][..]);
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 5);
        }

        #[test]
        fn decode_partly_received_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x00, // transaction id HI
                    0x11, // transaction id LO
                    0x00, // protocol id HI
                    0x00, // protocol id LO
                    0x00, // length HI
                    0x03, // length LO
                    0x66, // unit id
                    0x82, // exception = 0x80 + 0x02
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 8);
        }

        #[test]
        fn decode_exception_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x66, 0x82, // exception = 0x80 + 0x02
                    0x03, 0x00,
                ][..],
            );
            let rsp = codec.decode(&mut buf).unwrap().unwrap();

            assert_eq!(buf.len(), 1);
            assert_eq!(rsp.header, Header::new(0, 0x66));
            assert_eq!(
                rsp.body,
                ResponsePdu(Err(ExceptionResponse {
                    function: FunctionCode::ReadDiscreteInputs,
                    exception: ExceptionCode::IllegalDataValue,
                }))
            );
        }

        #[test]
        fn decode_with_invalid_protocol_id() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x00, 0x00, 0x33, // protocol id HI
                    0x12, // protocol id LO
                    0x00, 0x03, 0x66, 0x82, 0x03,
                ][..],
            );
            let err = codec.decode(&mut buf).unwrap_err();
            assert!(matches!(
                err,
                Error::Framing(FramingError::InvalidProtocolId(0x3312))
            ));
        }

        #[test]
        fn decode_with_invalid_length_field() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x66][..]);
            let err = codec.decode(&mut buf).unwrap_err();
            assert!(matches!(
                err,
                Error::Framing(FramingError::MessageTooLong(256))
            ));
            assert!(buf.is_empty());
        }

        #[test]
        fn encode_read_request() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            let request = RequestMessage::new(Header::new(0x0A0B, 0x00), Request::ReadInputRegisters(0x23, 5));
            codec.encode(&request, &mut buf).unwrap();
            assert_eq!(
                &buf[..],
                &[0x0A, 0x0B, 0x00, 0x00, 0x00, 0x06, 0x00, 0x04, 0x00, 0x23, 0x00, 0x05]
            );
        }

        #[test]
        fn headless_codec_appends_crc() {
            let mut codec = ClientCodec::new(true);
            let mut buf = BytesMut::new();
            let request = RequestMessage::new(Header::headless(0x11), Request::ReadHoldingRegisters(0x6B, 3));
            codec.encode(&request, &mut buf).unwrap();
            assert_eq!(&buf[..], &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]);
        }
    }

    mod server {
        use super::*;

        #[test]
        fn decode_two_requests_in_one_buffer() {
            // Given
            let mut client = ClientCodec::default();
            let first = RequestMessage::new(Header::new(1, 1), Request::ReadCoils(0x13, 0x25));
            let second = RequestMessage::new(Header::new(2, 1), Request::WriteSingleCoil(0xAC, true));
            let mut buf = BytesMut::new();
            client.encode(&first, &mut buf).unwrap();
            client.encode(&second, &mut buf).unwrap();

            // When
            let mut codec = ServerCodec::default();
            let decoded_first = codec.decode(&mut buf).unwrap();
            let decoded_second = codec.decode(&mut buf).unwrap();

            // Then
            assert_eq!(decoded_first, Some(first));
            assert_eq!(decoded_second, Some(second));
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }

        #[test]
        fn encode_response_keeps_transaction_id() {
            let request = RequestMessage::new(Header::new(0x1501, 0x01), Request::ReadHoldingRegisters(0, 1));
            let response = request.create_response(Ok(Response::ReadHoldingRegisters(vec![0xABCD])));
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::new();
            codec.encode(&response, &mut buf).unwrap();
            assert_eq!(
                &buf[..],
                &[0x15, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0xAB, 0xCD]
            );
        }
    }
}
