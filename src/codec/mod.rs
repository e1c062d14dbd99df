// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encoding and decoding of PDUs and messages, and the per-medium frame codecs.

use std::{
    convert::TryFrom,
    io::{self, Cursor},
};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{BufMut as _, Bytes, BytesMut};

use crate::{
    bits::{packed_size, BitVector},
    consts::{MAX_FIFO_COUNT, PROTOCOL_ID},
    error::FramingError,
    frame::*,
    unit::UnitId,
};

pub mod ascii;
pub mod rtu;
pub mod serial;
pub mod tcp;

/// Maximum request/response PDU size.
///
/// As defined for all media.
pub(crate) const MAX_PDU_SIZE: usize = 253;

/// Size of the MBAP fields in front of the unit identifier.
pub(crate) const MBAP_PREFIX_LEN: usize = 6;

#[allow(clippy::cast_possible_truncation)]
fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn put_words(buf: &mut BytesMut, words: &[Word]) {
    for w in words {
        buf.put_u16(*w);
    }
}

fn encode_file_records(buf: &mut BytesMut, records: &[FileRecord]) {
    buf.put_u8(u8_len(file_records_len(records)));
    for record in records {
        buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
        buf.put_u16(record.file_number);
        buf.put_u16(record.record_number);
        buf.put_u16(u16_len(record.values.len()));
        put_words(buf, &record.values);
    }
}

fn file_records_len(records: &[FileRecord]) -> usize {
    records.iter().map(|r| 7 + r.values.len() * 2).sum()
}

fn read_file_record_response_len(records: &[Vec<Word>]) -> usize {
    records.iter().map(|r| 2 + r.len() * 2).sum()
}

fn device_id_objects_len(objects: &[DeviceIdObject]) -> usize {
    objects.iter().map(|o| 2 + o.value.len()).sum()
}

pub(crate) fn encode_request_pdu(buf: &mut BytesMut, request: &Request) {
    use crate::frame::Request::*;
    buf.put_u8(request.function_code().value());
    match request {
        ReadCoils(address, quantity)
        | ReadDiscreteInputs(address, quantity)
        | ReadInputRegisters(address, quantity)
        | ReadHoldingRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        ReadExceptionStatus | GetCommEventCounter | GetCommEventLog | ReportSlaveId => {}
        Diagnostics(sub_function, data) => {
            buf.put_u16(*sub_function);
            buf.put_u16(*data);
        }
        WriteMultipleCoils(address, coils) => {
            buf.put_u16(*address);
            buf.put_u16(u16_len(coils.size()));
            buf.put_u8(u8_len(coils.byte_size()));
            buf.put_slice(coils.as_bytes());
        }
        WriteMultipleRegisters(address, words) => {
            buf.put_u16(*address);
            let len = words.len();
            buf.put_u16(u16_len(len));
            buf.put_u8(u8_len(len * 2));
            put_words(buf, words);
        }
        ReadFileRecord(requests) => {
            buf.put_u8(u8_len(requests.len() * 7));
            for request in requests {
                buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
                buf.put_u16(request.file_number);
                buf.put_u16(request.record_number);
                buf.put_u16(request.record_length);
            }
        }
        WriteFileRecord(records) => encode_file_records(buf, records),
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        ReadWriteMultipleRegisters(read_address, quantity, write_address, words) => {
            buf.put_u16(*read_address);
            buf.put_u16(*quantity);
            buf.put_u16(*write_address);
            let len = words.len();
            buf.put_u16(u16_len(len));
            buf.put_u8(u8_len(len * 2));
            put_words(buf, words);
        }
        ReadFifoQueue(address) => buf.put_u16(*address),
        ReadDeviceIdentification(read_code, object_id) => {
            buf.put_u8(MEI_TYPE_READ_DEVICE_IDENTIFICATION);
            buf.put_u8(read_code.value());
            buf.put_u8(*object_id);
        }
        IllegalFunction(_, data) => buf.put_slice(data),
    }
}

pub(crate) fn encode_response_pdu(buf: &mut BytesMut, response: &Response) {
    use crate::frame::Response::*;
    buf.put_u8(response.function_code().value());
    match response {
        ReadCoils(coils) | ReadDiscreteInputs(coils) => {
            buf.put_u8(u8_len(coils.byte_size()));
            buf.put_slice(coils.as_bytes());
        }
        ReadInputRegisters(registers)
        | ReadHoldingRegisters(registers)
        | ReadWriteMultipleRegisters(registers) => {
            buf.put_u8(u8_len(registers.len() * 2));
            put_words(buf, registers);
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        ReadExceptionStatus(status) => buf.put_u8(*status),
        Diagnostics(first, second)
        | GetCommEventCounter(first, second)
        | WriteMultipleCoils(first, second)
        | WriteMultipleRegisters(first, second) => {
            buf.put_u16(*first);
            buf.put_u16(*second);
        }
        GetCommEventLog(log) => {
            buf.put_u8(u8_len(6 + log.events.len()));
            buf.put_u16(log.status);
            buf.put_u16(log.event_count);
            buf.put_u16(log.message_count);
            buf.put_slice(&log.events);
        }
        ReportSlaveId(slave_id, run_indication, additional_data) => {
            buf.put_u8(u8_len(2 + additional_data.len()));
            buf.put_u8(*slave_id);
            buf.put_u8(if *run_indication { 0xFF } else { 0x00 });
            buf.put_slice(additional_data);
        }
        ReadFileRecord(records) => {
            buf.put_u8(u8_len(read_file_record_response_len(records)));
            for values in records {
                buf.put_u8(u8_len(1 + values.len() * 2));
                buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
                put_words(buf, values);
            }
        }
        WriteFileRecord(records) => encode_file_records(buf, records),
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        ReadFifoQueue(values) => {
            buf.put_u16(u16_len(2 + values.len() * 2));
            buf.put_u16(u16_len(values.len()));
            put_words(buf, values);
        }
        ReadDeviceIdentification(rsp) => {
            buf.put_u8(MEI_TYPE_READ_DEVICE_IDENTIFICATION);
            buf.put_u8(rsp.read_code.value());
            buf.put_u8(rsp.conformity_level.value());
            buf.put_u8(if rsp.more_follows { 0xFF } else { 0x00 });
            buf.put_u8(rsp.next_object_id);
            buf.put_u8(u8_len(rsp.device_id_objects.len()));
            for object in &rsp.device_id_objects {
                buf.put_u8(object.id);
                buf.put_u8(u8_len(object.value.len()));
                buf.put_slice(&object.value);
            }
        }
        Custom(_, custom_data) => buf.put_slice(custom_data),
    }
}

pub(crate) fn encode_exception_response_pdu(buf: &mut BytesMut, rsp: ExceptionResponse) {
    debug_assert!(rsp.function.value() < 0x80);
    buf.put_u8(rsp.function.value() | 0x80);
    buf.put_u8(rsp.exception.into());
}

pub(crate) fn encode_response_result_pdu(
    buf: &mut BytesMut,
    res: &Result<Response, ExceptionResponse>,
) {
    match res {
        Ok(rsp) => encode_response_pdu(buf, rsp),
        Err(rsp) => encode_exception_response_pdu(buf, *rsp),
    }
}

/// Size of the encoded request PDU, including the function code.
#[must_use]
pub fn request_pdu_len(request: &Request) -> usize {
    use crate::frame::Request::*;
    match request {
        ReadCoils(_, _)
        | ReadDiscreteInputs(_, _)
        | ReadInputRegisters(_, _)
        | ReadHoldingRegisters(_, _)
        | WriteSingleRegister(_, _)
        | WriteSingleCoil(_, _)
        | Diagnostics(_, _) => 5,
        ReadExceptionStatus | GetCommEventCounter | GetCommEventLog | ReportSlaveId => 1,
        WriteMultipleCoils(_, coils) => 6 + coils.byte_size(),
        WriteMultipleRegisters(_, data) => 6 + data.len() * 2,
        ReadFileRecord(requests) => 2 + requests.len() * 7,
        WriteFileRecord(records) => 2 + file_records_len(records),
        MaskWriteRegister(_, _, _) => 7,
        ReadWriteMultipleRegisters(_, _, _, data) => 10 + data.len() * 2,
        ReadFifoQueue(_) => 3,
        ReadDeviceIdentification(_, _) => 4,
        IllegalFunction(_, data) => 1 + data.len(),
    }
}

/// Size of the encoded response PDU, including the function code.
#[must_use]
pub fn response_pdu_len(response: &Response) -> usize {
    use crate::frame::Response::*;
    match response {
        ReadCoils(coils) | ReadDiscreteInputs(coils) => 2 + coils.byte_size(),
        WriteSingleCoil(_, _)
        | WriteMultipleCoils(_, _)
        | WriteMultipleRegisters(_, _)
        | WriteSingleRegister(_, _)
        | Diagnostics(_, _)
        | GetCommEventCounter(_, _) => 5,
        ReadInputRegisters(data)
        | ReadHoldingRegisters(data)
        | ReadWriteMultipleRegisters(data) => 2 + data.len() * 2,
        ReadExceptionStatus(_) => 2,
        GetCommEventLog(log) => 8 + log.events.len(),
        ReportSlaveId(_, _, data) => 3 + data.len(),
        ReadFileRecord(records) => 2 + read_file_record_response_len(records),
        WriteFileRecord(records) => 2 + file_records_len(records),
        MaskWriteRegister(_, _, _) => 7,
        ReadFifoQueue(values) => 5 + values.len() * 2,
        ReadDeviceIdentification(rsp) => 7 + device_id_objects_len(&rsp.device_id_objects),
        Custom(_, data) => 1 + data.len(),
    }
}

#[must_use]
pub fn response_result_pdu_len(res: &Result<Response, ExceptionResponse>) -> usize {
    match res {
        Ok(rsp) => response_pdu_len(rsp),
        Err(_) => 2,
    }
}

fn check_pdu_len(len: usize) -> Result<usize, FramingError> {
    if len > MAX_PDU_SIZE {
        return Err(FramingError::MessageTooLong(len));
    }
    Ok(len)
}

/// Writes the unit identifier followed by the request PDU.
pub(crate) fn encode_request_adu_body(
    buf: &mut BytesMut,
    unit_id: UnitId,
    request: &Request,
) -> Result<(), FramingError> {
    let len = check_pdu_len(request_pdu_len(request))?;
    buf.reserve(1 + len);
    buf.put_u8(unit_id);
    encode_request_pdu(buf, request);
    Ok(())
}

/// Writes the unit identifier followed by the response PDU.
pub(crate) fn encode_response_adu_body(
    buf: &mut BytesMut,
    unit_id: UnitId,
    pdu: &ResponsePdu,
) -> Result<(), FramingError> {
    let len = check_pdu_len(response_result_pdu_len(&pdu.0))?;
    buf.reserve(1 + len);
    buf.put_u8(unit_id);
    encode_response_result_pdu(buf, &pdu.0);
    Ok(())
}

pub(crate) fn encode_mbap_prefix(buf: &mut BytesMut, header: &Header, data_length: u16) {
    buf.reserve(MBAP_PREFIX_LEN);
    buf.put_u16(header.transaction_id);
    buf.put_u16(header.protocol_id);
    buf.put_u16(data_length);
}

/// Encodes a request message.
///
/// The transaction header is only written if the message is not headless.
pub fn encode_request(buf: &mut BytesMut, message: &RequestMessage) -> Result<(), FramingError> {
    if !message.header.headless {
        encode_mbap_prefix(buf, &message.header, message.data_length());
    }
    encode_request_adu_body(buf, message.header.unit_id, &message.body)
}

/// Encodes a response message.
///
/// The transaction header is only written if the message is not headless.
pub fn encode_response(buf: &mut BytesMut, message: &ResponseMessage) -> Result<(), FramingError> {
    if !message.header.headless {
        encode_mbap_prefix(buf, &message.header, message.data_length());
    }
    encode_response_adu_body(buf, message.header.unit_id, &message.body)
}

/// Splits a complete message into its header and PDU.
///
/// Returns the announced data length for messages with MBAP header.
fn decode_header(bytes: Bytes, headless: bool) -> Result<(Header, Option<u16>, Bytes), FramingError> {
    if headless {
        if bytes.len() < 2 {
            return Err(FramingError::malformed("incomplete message"));
        }
        let header = Header::headless(bytes[0]);
        return Ok((header, None, bytes.slice(1..)));
    }
    if bytes.len() < MBAP_PREFIX_LEN + 2 {
        return Err(FramingError::malformed("incomplete message"));
    }
    let rdr = &mut Cursor::new(&bytes);
    let transaction_id = read_u16_be(rdr)?;
    let protocol_id = read_u16_be(rdr)?;
    let data_length = read_u16_be(rdr)?;
    let unit_id = read_u8(rdr)?;
    if protocol_id != PROTOCOL_ID {
        return Err(FramingError::InvalidProtocolId(protocol_id));
    }
    let received = bytes.len() - MBAP_PREFIX_LEN;
    if usize::from(data_length) != received {
        return Err(FramingError::LengthMismatch {
            announced: data_length.into(),
            decoded: received,
        });
    }
    let header = Header {
        transaction_id,
        protocol_id,
        unit_id,
        headless: false,
    };
    Ok((header, Some(data_length), bytes.slice(MBAP_PREFIX_LEN + 1..)))
}

fn verify_data_length(announced: Option<u16>, decoded: u16) -> Result<(), FramingError> {
    match announced {
        Some(announced) if announced != decoded => Err(FramingError::LengthMismatch {
            announced: announced.into(),
            decoded: decoded.into(),
        }),
        _ => Ok(()),
    }
}

/// Decodes a complete request message, e.g. the contents of a datagram.
pub fn decode_request(bytes: Bytes, headless: bool) -> Result<RequestMessage, FramingError> {
    let (header, announced, pdu) = decode_header(bytes, headless)?;
    let message = RequestMessage::new(header, Request::try_from(pdu)?);
    verify_data_length(announced, message.data_length())?;
    Ok(message)
}

/// Decodes a complete response message, e.g. the contents of a datagram.
pub fn decode_response(bytes: Bytes, headless: bool) -> Result<ResponseMessage, FramingError> {
    let (header, announced, pdu) = decode_header(bytes, headless)?;
    let message = ResponseMessage {
        header,
        body: ResponsePdu::try_from(pdu)?,
    };
    verify_data_length(announced, message.data_length())?;
    Ok(message)
}

fn truncated(_: io::Error) -> FramingError {
    FramingError::malformed("truncated payload")
}

fn read_u8(rdr: &mut Cursor<&Bytes>) -> Result<u8, FramingError> {
    rdr.read_u8().map_err(truncated)
}

fn read_u16_be(rdr: &mut Cursor<&Bytes>) -> Result<u16, FramingError> {
    rdr.read_u16::<BigEndian>().map_err(truncated)
}

fn read_words(rdr: &mut Cursor<&Bytes>, count: usize) -> Result<Vec<Word>, FramingError> {
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(read_u16_be(rdr)?);
    }
    Ok(data)
}

#[allow(clippy::cast_possible_truncation)]
fn position(rdr: &Cursor<&Bytes>) -> usize {
    rdr.position() as usize
}

fn read_bytes(rdr: &mut Cursor<&Bytes>, len: usize) -> Result<Bytes, FramingError> {
    let start = position(rdr);
    let end = start + len;
    if end > rdr.get_ref().len() {
        return Err(truncated(io::ErrorKind::UnexpectedEof.into()));
    }
    let bytes = rdr.get_ref().slice(start..end);
    rdr.set_position(end as u64);
    Ok(bytes)
}

fn read_bool(rdr: &mut Cursor<&Bytes>, what: &str) -> Result<bool, FramingError> {
    match read_u8(rdr)? {
        0x00 => Ok(false),
        0xFF => Ok(true),
        value => Err(FramingError::malformed(format!(
            "invalid {what}: 0x{value:02X}"
        ))),
    }
}

fn read_reference_type(rdr: &mut Cursor<&Bytes>) -> Result<(), FramingError> {
    let reference_type = read_u8(rdr)?;
    if reference_type != FILE_RECORD_REFERENCE_TYPE {
        return Err(FramingError::malformed(format!(
            "invalid reference type: 0x{reference_type:02X}"
        )));
    }
    Ok(())
}

fn read_file_records(rdr: &mut Cursor<&Bytes>) -> Result<Vec<FileRecord>, FramingError> {
    let byte_count = usize::from(read_u8(rdr)?);
    let end = position(rdr) + byte_count;
    let mut records = Vec::new();
    while position(rdr) < end {
        read_reference_type(rdr)?;
        let file_number = read_u16_be(rdr)?;
        let record_number = read_u16_be(rdr)?;
        let record_length = read_u16_be(rdr)?;
        let values = read_words(rdr, record_length.into())?;
        records.push(FileRecord {
            file_number,
            record_number,
            values,
        });
    }
    if position(rdr) != end {
        return Err(FramingError::malformed("invalid file record byte count"));
    }
    Ok(records)
}

fn read_mei_type(rdr: &mut Cursor<&Bytes>) -> Result<(), FramingError> {
    let mei_type = read_u8(rdr)?;
    if mei_type != MEI_TYPE_READ_DEVICE_IDENTIFICATION {
        return Err(FramingError::malformed(format!(
            "unsupported MEI type: 0x{mei_type:02X}"
        )));
    }
    Ok(())
}

fn read_read_code(rdr: &mut Cursor<&Bytes>) -> Result<ReadCode, FramingError> {
    let value = read_u8(rdr)?;
    ReadCode::try_from_value(value)
        .ok_or_else(|| FramingError::malformed(format!("invalid read code: 0x{value:02X}")))
}

/// Verify that all data has been consumed and decoded.
fn verify_consumed(rdr: &Cursor<&Bytes>) -> Result<(), FramingError> {
    let announced = rdr.get_ref().len();
    let decoded = position(rdr);
    if decoded != announced {
        return Err(FramingError::LengthMismatch { announced, decoded });
    }
    Ok(())
}

impl TryFrom<Bytes> for Request {
    type Error = FramingError;

    #[allow(clippy::too_many_lines)]
    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Request::*;
        if bytes.len() > MAX_PDU_SIZE {
            return Err(FramingError::MessageTooLong(bytes.len()));
        }
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = read_u8(rdr)?;
        let req = match fn_code {
            0x01 => ReadCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x02 => ReadDiscreteInputs(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x03 => ReadHoldingRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x04 => ReadInputRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x05 => WriteSingleCoil(read_u16_be(rdr)?, coil_to_bool(read_u16_be(rdr)?)?),
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x07 => ReadExceptionStatus,
            0x08 => Diagnostics(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x0B => GetCommEventCounter,
            0x0C => GetCommEventLog,
            0x0F => {
                let address = read_u16_be(rdr)?;
                let quantity = read_u16_be(rdr)?;
                let byte_count = usize::from(read_u8(rdr)?);
                if byte_count != packed_size(quantity.into()) {
                    return Err(FramingError::malformed("invalid coil quantity"));
                }
                let mut coils = BitVector::from_bytes(&read_bytes(rdr, byte_count)?);
                coils.trim(quantity.into());
                WriteMultipleCoils(address, coils)
            }
            0x10 => {
                let address = read_u16_be(rdr)?;
                let quantity = read_u16_be(rdr)?;
                let byte_count = usize::from(read_u8(rdr)?);
                if byte_count != usize::from(quantity) * 2 {
                    return Err(FramingError::malformed("invalid register quantity"));
                }
                WriteMultipleRegisters(address, read_words(rdr, quantity.into())?)
            }
            0x11 => ReportSlaveId,
            0x14 => {
                let byte_count = usize::from(read_u8(rdr)?);
                if byte_count % 7 != 0 {
                    return Err(FramingError::malformed("invalid file record byte count"));
                }
                let mut requests = Vec::with_capacity(byte_count / 7);
                for _ in 0..byte_count / 7 {
                    read_reference_type(rdr)?;
                    requests.push(FileRecordRequest {
                        file_number: read_u16_be(rdr)?,
                        record_number: read_u16_be(rdr)?,
                        record_length: read_u16_be(rdr)?,
                    });
                }
                ReadFileRecord(requests)
            }
            0x15 => WriteFileRecord(read_file_records(rdr)?),
            0x16 => {
                let address = read_u16_be(rdr)?;
                let and_mask = read_u16_be(rdr)?;
                let or_mask = read_u16_be(rdr)?;
                MaskWriteRegister(address, and_mask, or_mask)
            }
            0x17 => {
                let read_address = read_u16_be(rdr)?;
                let read_quantity = read_u16_be(rdr)?;
                let write_address = read_u16_be(rdr)?;
                let write_quantity = read_u16_be(rdr)?;
                let write_count = usize::from(read_u8(rdr)?);
                if write_count != usize::from(write_quantity) * 2 {
                    return Err(FramingError::malformed("invalid write quantity"));
                }
                let data = read_words(rdr, write_quantity.into())?;
                ReadWriteMultipleRegisters(read_address, read_quantity, write_address, data)
            }
            0x18 => ReadFifoQueue(read_u16_be(rdr)?),
            0x2B => {
                read_mei_type(rdr)?;
                let read_code = read_read_code(rdr)?;
                ReadDeviceIdentification(read_code, read_u8(rdr)?)
            }
            fn_code if fn_code < 0x80 => {
                // Keep the remaining bytes for answering with an exception.
                return Ok(IllegalFunction(fn_code, bytes.slice(1..)));
            }
            fn_code => {
                return Err(FramingError::malformed(format!(
                    "invalid function code: 0x{fn_code:02X}"
                )));
            }
        };
        verify_consumed(rdr)?;
        Ok(req)
    }
}

impl TryFrom<Bytes> for Response {
    type Error = FramingError;

    #[allow(clippy::too_many_lines)]
    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Response::*;
        if bytes.len() > MAX_PDU_SIZE {
            return Err(FramingError::MessageTooLong(bytes.len()));
        }
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = read_u8(rdr)?;
        let rsp = match fn_code {
            0x01 | 0x02 => {
                let byte_count = usize::from(read_u8(rdr)?);
                // The requested quantity is unknown here, so all bits
                // of the transmitted bytes are kept.
                let coils = BitVector::from_bytes(&read_bytes(rdr, byte_count)?);
                if fn_code == 0x01 {
                    ReadCoils(coils)
                } else {
                    ReadDiscreteInputs(coils)
                }
            }
            0x03 | 0x04 | 0x17 => {
                let byte_count = read_u8(rdr)?;
                if byte_count % 2 != 0 {
                    return Err(FramingError::malformed("invalid register byte count"));
                }
                let data = read_words(rdr, usize::from(byte_count / 2))?;
                match fn_code {
                    0x03 => ReadHoldingRegisters(data),
                    0x04 => ReadInputRegisters(data),
                    _ => ReadWriteMultipleRegisters(data),
                }
            }
            0x05 => WriteSingleCoil(read_u16_be(rdr)?, coil_to_bool(read_u16_be(rdr)?)?),
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x07 => ReadExceptionStatus(read_u8(rdr)?),
            0x08 => Diagnostics(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x0B => GetCommEventCounter(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x0C => {
                let byte_count = usize::from(read_u8(rdr)?);
                if byte_count < 6 {
                    return Err(FramingError::malformed("comm event log too short"));
                }
                GetCommEventLog(CommEventLog {
                    status: read_u16_be(rdr)?,
                    event_count: read_u16_be(rdr)?,
                    message_count: read_u16_be(rdr)?,
                    events: read_bytes(rdr, byte_count - 6)?.to_vec(),
                })
            }
            0x0F => WriteMultipleCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x10 => WriteMultipleRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x11 => {
                let byte_count = usize::from(read_u8(rdr)?);
                if byte_count < 2 {
                    return Err(FramingError::malformed("report slave id too short"));
                }
                let slave_id = read_u8(rdr)?;
                let run_indication = read_bool(rdr, "run indication status")?;
                let data = read_bytes(rdr, byte_count - 2)?.to_vec();
                ReportSlaveId(slave_id, run_indication, data)
            }
            0x14 => {
                let byte_count = usize::from(read_u8(rdr)?);
                let end = position(rdr) + byte_count;
                let mut records = Vec::new();
                while position(rdr) < end {
                    let len = usize::from(read_u8(rdr)?);
                    if len % 2 != 1 {
                        return Err(FramingError::malformed("invalid file record length"));
                    }
                    read_reference_type(rdr)?;
                    records.push(read_words(rdr, len / 2)?);
                }
                if position(rdr) != end {
                    return Err(FramingError::malformed("invalid file record byte count"));
                }
                ReadFileRecord(records)
            }
            0x15 => WriteFileRecord(read_file_records(rdr)?),
            0x16 => {
                let address = read_u16_be(rdr)?;
                let and_mask = read_u16_be(rdr)?;
                let or_mask = read_u16_be(rdr)?;
                MaskWriteRegister(address, and_mask, or_mask)
            }
            0x18 => {
                let byte_count = usize::from(read_u16_be(rdr)?);
                let fifo_count = usize::from(read_u16_be(rdr)?);
                if byte_count != 2 + fifo_count * 2 || fifo_count > MAX_FIFO_COUNT {
                    return Err(FramingError::malformed("invalid FIFO count"));
                }
                ReadFifoQueue(read_words(rdr, fifo_count)?)
            }
            0x2B => {
                read_mei_type(rdr)?;
                let read_code = read_read_code(rdr)?;
                let conformity = read_u8(rdr)?;
                let conformity_level =
                    ConformityLevel::try_from_value(conformity).ok_or_else(|| {
                        FramingError::malformed(format!(
                            "invalid conformity level: 0x{conformity:02X}"
                        ))
                    })?;
                let more_follows = read_bool(rdr, "more follows")?;
                let next_object_id = read_u8(rdr)?;
                let object_count = read_u8(rdr)?;
                let mut device_id_objects = Vec::with_capacity(object_count.into());
                for _ in 0..object_count {
                    let id = read_u8(rdr)?;
                    let len = usize::from(read_u8(rdr)?);
                    let value = read_bytes(rdr, len)?;
                    device_id_objects.push(DeviceIdObject { id, value });
                }
                ReadDeviceIdentification(ReadDeviceIdentificationResponse {
                    read_code,
                    conformity_level,
                    more_follows,
                    next_object_id,
                    device_id_objects,
                })
            }
            fn_code if fn_code < 0x80 => {
                return Ok(Custom(fn_code, bytes.slice(1..)));
            }
            fn_code => {
                return Err(FramingError::malformed(format!(
                    "invalid function code: 0x{fn_code:02X}"
                )));
            }
        };
        verify_consumed(rdr)?;
        Ok(rsp)
    }
}

impl TryFrom<Bytes> for ExceptionResponse {
    type Error = FramingError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let rdr = &mut Cursor::new(&bytes);
        let fn_err_code = read_u8(rdr)?;
        if fn_err_code < 0x80 {
            return Err(FramingError::malformed("invalid exception function code"));
        }
        let function = fn_err_code & 0x7F;
        let exception = ExceptionCode::new(read_u8(rdr)?);
        verify_consumed(rdr)?;
        Ok(ExceptionResponse {
            function: FunctionCode::new(function),
            exception,
        })
    }
}

impl TryFrom<Bytes> for ResponsePdu {
    type Error = FramingError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let fn_code = *bytes
            .first()
            .ok_or_else(|| FramingError::malformed("empty PDU"))?;
        let pdu = if fn_code < 0x80 {
            Response::try_from(bytes)?.into()
        } else {
            ExceptionResponse::try_from(bytes)?.into()
        };
        Ok(pdu)
    }
}

fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> Result<bool, FramingError> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(FramingError::malformed(format!(
            "invalid coil value: 0x{coil:04X}"
        ))),
    }
}
