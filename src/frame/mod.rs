// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod message;

pub use self::message::*;

use std::{
    error,
    fmt::{self, Display},
};

use bytes::Bytes;

use crate::bits::BitVector;

/// MEI type code (`0x0E`) for "Read Device Identification" (function 0x2B).
pub const MEI_TYPE_READ_DEVICE_IDENTIFICATION: u8 = 0x0E;

/// Reference type of every file record sub-request.
pub const FILE_RECORD_REFERENCE_TYPE: u8 = 0x06;

/// A Modbus function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 01 (0x01) Read Coils
    ReadCoils,

    /// 02 (0x02) Read Discrete Inputs
    ReadDiscreteInputs,

    /// 03 (0x03) Read Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,

    /// 05 (0x05) Write Single Coil
    WriteSingleCoil,

    /// 06 (0x06) Write Single Register
    WriteSingleRegister,

    /// 07 (0x07) Read Exception Status (Serial Line only)
    ReadExceptionStatus,

    /// 08 (0x08) Diagnostics (Serial Line only)
    Diagnostics,

    /// 11 (0x0B) Get Comm Event Counter (Serial Line only)
    GetCommEventCounter,

    /// 12 (0x0C) Get Comm Event Log (Serial Line only)
    GetCommEventLog,

    /// 15 (0x0F) Write Multiple Coils
    WriteMultipleCoils,

    /// 16 (0x10) Write Multiple Registers
    WriteMultipleRegisters,

    /// 17 (0x11) Report Slave ID (Serial Line only)
    ReportSlaveId,

    /// 20 (0x14) Read File Record
    ReadFileRecord,

    /// 21 (0x15) Write File Record
    WriteFileRecord,

    /// 22 (0x16) Mask Write Register
    MaskWriteRegister,

    /// 23 (0x17) Read/Write Multiple Registers
    ReadWriteMultipleRegisters,

    /// 24 (0x18) Read FIFO Queue
    ReadFifoQueue,

    /// 43 (0x2B) Encapsulated Interface Transport
    EncapsulatedInterfaceTransport,

    /// Any other function code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x08 => Self::Diagnostics,
            0x0B => Self::GetCommEventCounter,
            0x0C => Self::GetCommEventLog,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportSlaveId,
            0x14 => Self::ReadFileRecord,
            0x15 => Self::WriteFileRecord,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x18 => Self::ReadFifoQueue,
            0x2B => Self::EncapsulatedInterfaceTransport,
            code => Self::Custom(code),
        }
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadExceptionStatus => 0x07,
            Self::Diagnostics => 0x08,
            Self::GetCommEventCounter => 0x0B,
            Self::GetCommEventLog => 0x0C,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportSlaveId => 0x11,
            Self::ReadFileRecord => 0x14,
            Self::WriteFileRecord => 0x15,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::ReadFifoQueue => 0x18,
            Self::EncapsulatedInterfaceTransport => 0x2B,
            Self::Custom(code) => code,
        }
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address* or
/// *register address* is often specified as a number with 1-based indexing.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items.
///
/// Transmitted using a big-endian representation.
pub type Word = u16;

/// Number of items to process.
pub type Quantity = u16;

/// A sub-request of "Read File Record" (0x14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecordRequest {
    pub file_number: u16,
    pub record_number: u16,
    /// Number of registers to read.
    pub record_length: Quantity,
}

/// A sub-request of "Write File Record" (0x15), echoed by the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_number: u16,
    pub record_number: u16,
    pub values: Vec<Word>,
}

/// Contents of a "Get Comm Event Log" (0x0C) response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommEventLog {
    pub status: Word,
    pub event_count: Word,
    pub message_count: Word,
    /// Most recent event first.
    pub events: Vec<u8>,
}

/// A request represents a message from the master (client) to the slave (server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read multiple coils: address of the first coil, number of coils.
    ReadCoils(Address, Quantity),

    /// Read multiple discrete inputs: address of the first input, number of inputs.
    ReadDiscreteInputs(Address, Quantity),

    /// Read multiple holding registers: address of the first register, number of registers.
    ReadHoldingRegisters(Address, Quantity),

    /// Read multiple input registers: address of the first register, number of registers.
    ReadInputRegisters(Address, Quantity),

    /// Write a single coil.
    WriteSingleCoil(Address, Coil),

    /// Write a single holding register.
    WriteSingleRegister(Address, Word),

    ReadExceptionStatus,

    /// Diagnostics with sub-function code and data word.
    Diagnostics(u16, Word),

    GetCommEventCounter,

    GetCommEventLog,

    /// Write multiple coils starting at the given address.
    WriteMultipleCoils(Address, BitVector),

    /// Write multiple holding registers starting at the given address.
    WriteMultipleRegisters(Address, Vec<Word>),

    ReportSlaveId,

    ReadFileRecord(Vec<FileRecordRequest>),

    WriteFileRecord(Vec<FileRecord>),

    /// Set or clear individual bits of a holding register.
    /// The parameters are the address, the AND mask and the OR mask.
    MaskWriteRegister(Address, Word, Word),

    /// Write registers, then read registers, in a single transaction.
    /// The parameters are the read address, the read quantity,
    /// the write address and the values to write.
    ReadWriteMultipleRegisters(Address, Quantity, Address, Vec<Word>),

    /// Read the contents of a FIFO queue of registers at the pointer address.
    ReadFifoQueue(Address),

    /// Read device identification: the [`ReadCode`] and the first object to return
    /// (stream access) or the object to read (individual access).
    ReadDeviceIdentification(ReadCode, ObjectId),

    /// A function code without a known layout.
    ///
    /// Decoding never fails because of an unknown function code. Executing this
    /// request answers with [`ExceptionCode::IllegalFunction`].
    IllegalFunction(u8, Bytes),
}

impl Request {
    /// Get the [`FunctionCode`] of the [`Request`].
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Request::*;

        match self {
            ReadCoils(_, _) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_, _) => FunctionCode::ReadDiscreteInputs,
            ReadHoldingRegisters(_, _) => FunctionCode::ReadHoldingRegisters,
            ReadInputRegisters(_, _) => FunctionCode::ReadInputRegisters,
            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            ReadExceptionStatus => FunctionCode::ReadExceptionStatus,
            Diagnostics(_, _) => FunctionCode::Diagnostics,
            GetCommEventCounter => FunctionCode::GetCommEventCounter,
            GetCommEventLog => FunctionCode::GetCommEventLog,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
            ReportSlaveId => FunctionCode::ReportSlaveId,
            ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,
            ReadWriteMultipleRegisters(_, _, _, _) => FunctionCode::ReadWriteMultipleRegisters,
            ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            ReadDeviceIdentification(_, _) => FunctionCode::EncapsulatedInterfaceTransport,
            IllegalFunction(code, _) => FunctionCode::Custom(*code),
        }
    }
}

/// The data of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Coil values that have been read.
    ///
    /// Decoded responses contain all bits of the transmitted bytes until they
    /// are trimmed to the requested quantity, see [`Response::fit_to()`].
    ReadCoils(BitVector),

    /// Discrete input values that have been read, see [`Response::ReadCoils`].
    ReadDiscreteInputs(BitVector),

    ReadHoldingRegisters(Vec<Word>),

    ReadInputRegisters(Vec<Word>),

    /// Address and value of the written coil.
    WriteSingleCoil(Address, Coil),

    /// Address and value of the written register.
    WriteSingleRegister(Address, Word),

    /// Eight exception status outputs of the device.
    ReadExceptionStatus(u8),

    /// Echoed sub-function code and data word.
    Diagnostics(u16, Word),

    /// Status word and event count.
    GetCommEventCounter(Word, Word),

    GetCommEventLog(CommEventLog),

    /// Start address and number of written coils.
    WriteMultipleCoils(Address, Quantity),

    /// Start address and number of written registers.
    WriteMultipleRegisters(Address, Quantity),

    /// Slave ID, run indicator status and additional device specific data.
    ReportSlaveId(u8, bool, Vec<u8>),

    /// Register values of each requested record, in request order.
    ReadFileRecord(Vec<Vec<Word>>),

    WriteFileRecord(Vec<FileRecord>),

    /// Address, AND mask and OR mask of the modified register.
    MaskWriteRegister(Address, Word, Word),

    /// Register values that have been read after writing.
    ReadWriteMultipleRegisters(Vec<Word>),

    /// Queued register values, oldest first.
    ReadFifoQueue(Vec<Word>),

    ReadDeviceIdentification(ReadDeviceIdentificationResponse),

    /// Function code and raw payload of a response without a known layout.
    Custom(u8, Bytes),
}

impl Response {
    /// Get the [`FunctionCode`] of the [`Response`].
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Response::*;

        match self {
            ReadCoils(_) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            ReadExceptionStatus(_) => FunctionCode::ReadExceptionStatus,
            Diagnostics(_, _) => FunctionCode::Diagnostics,
            GetCommEventCounter(_, _) => FunctionCode::GetCommEventCounter,
            GetCommEventLog(_) => FunctionCode::GetCommEventLog,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
            ReportSlaveId(_, _, _) => FunctionCode::ReportSlaveId,
            ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,
            ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            ReadDeviceIdentification(_) => FunctionCode::EncapsulatedInterfaceTransport,
            Custom(code, _) => FunctionCode::Custom(*code),
        }
    }

    /// Trims bit vectors to the quantity that `request` asked for.
    ///
    /// Bits are transmitted in whole bytes, so a decoded response may carry
    /// up to 7 padding bits.
    pub fn fit_to(&mut self, request: &Request) {
        match (self, request) {
            (Self::ReadCoils(bits), Request::ReadCoils(_, quantity))
            | (Self::ReadDiscreteInputs(bits), Request::ReadDiscreteInputs(_, quantity)) => {
                bits.trim(usize::from(*quantity));
            }
            _ => {}
        }
    }
}

/// A slave exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    SlaveDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    SlaveDeviceBusy,
    /// 0x07
    NegativeAcknowledge,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    ///
    /// Prefer [`Self::new()`] over constructing this variant with a predefined value.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        use crate::frame::ExceptionCode::*;
        match from {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            SlaveDeviceFailure => 0x04,
            Acknowledge => 0x05,
            SlaveDeviceBusy => 0x06,
            NegativeAcknowledge => 0x07,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use crate::frame::ExceptionCode::*;

        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => SlaveDeviceFailure,
            0x05 => Acknowledge,
            0x06 => SlaveDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    pub(crate) fn description(&self) -> &str {
        use crate::frame::ExceptionCode::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            SlaveDeviceFailure => "Slave device failure",
            Acknowledge => "Acknowledge",
            SlaveDeviceBusy => "Slave device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

/// Access type of "Read Device Identification".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadCode {
    /// `0x01`: basic identification objects, stream access.
    Basic,
    /// `0x02`: regular identification objects, stream access.
    Regular,
    /// `0x03`: extended identification objects, stream access.
    Extended,
    /// `0x04`: one specific object, individual access.
    Specific,
}

impl ReadCode {
    #[must_use]
    pub const fn try_from_value(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => ReadCode::Basic,
            0x02 => ReadCode::Regular,
            0x03 => ReadCode::Extended,
            0x04 => ReadCode::Specific,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            ReadCode::Basic => 0x01,
            ReadCode::Regular => 0x02,
            ReadCode::Extended => 0x03,
            ReadCode::Specific => 0x04,
        }
    }
}

/// Identification support level announced by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConformityLevel {
    /// `0x01`
    BasicStreamOnly,
    /// `0x02`
    RegularStreamOnly,
    /// `0x03`
    ExtendedStreamOnly,
    /// `0x81`
    Basic,
    /// `0x82`
    Regular,
    /// `0x83`
    Extended,
}

impl ConformityLevel {
    #[must_use]
    pub const fn try_from_value(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => ConformityLevel::BasicStreamOnly,
            0x02 => ConformityLevel::RegularStreamOnly,
            0x03 => ConformityLevel::ExtendedStreamOnly,
            0x81 => ConformityLevel::Basic,
            0x82 => ConformityLevel::Regular,
            0x83 => ConformityLevel::Extended,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            ConformityLevel::BasicStreamOnly => 0x01,
            ConformityLevel::RegularStreamOnly => 0x02,
            ConformityLevel::ExtendedStreamOnly => 0x03,
            ConformityLevel::Basic => 0x81,
            ConformityLevel::Regular => 0x82,
            ConformityLevel::Extended => 0x83,
        }
    }
}

/// Identifier of a device identification object, e.g. `0x00` for the vendor name.
pub type ObjectId = u8;

/// A single device identification object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdObject {
    pub id: ObjectId,
    pub value: Bytes,
}

impl DeviceIdObject {
    #[must_use]
    pub fn new(id: ObjectId, value: impl Into<Bytes>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    /// The value as UTF-8 text, if it is valid.
    pub fn value_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Response data of "Read Device Identification" (0x2B/0x0E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDeviceIdentificationResponse {
    pub read_code: ReadCode,
    pub conformity_level: ConformityLevel,
    /// More objects are available in a subsequent request.
    pub more_follows: bool,
    /// First object of the subsequent request, `0` if nothing follows.
    pub next_object_id: ObjectId,
    pub device_id_objects: Vec<DeviceIdObject>,
}

/// A slave exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: ExceptionCode,
}

/// Represents a message from the slave (server) to the master (client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu(pub Result<Response, ExceptionResponse>);

impl ResponsePdu {
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        match &self.0 {
            Ok(response) => response.function_code(),
            Err(ExceptionResponse { function, .. }) => *function,
        }
    }

    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.0.is_err()
    }
}

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}
