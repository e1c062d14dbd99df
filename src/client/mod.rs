// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus clients

use std::{fmt::Debug, io};

use async_trait::async_trait;

use crate::{
    frame::*,
    unit::{Unit, UnitContext},
    Error, Result, ValidationError,
};

pub mod ascii;
pub mod rtu;
pub mod tcp;
pub mod udp;

#[cfg(feature = "sync")]
pub mod sync;

/// Transport independent asynchronous client trait
#[async_trait]
pub trait Client: UnitContext + Send + Debug {
    /// Invokes a _Modbus_ function.
    ///
    /// Exception responses of the peer are returned as [`Error::Exception`].
    async fn call(&mut self, request: Request) -> Result<Response>;

    /// Disconnects the client.
    ///
    /// Permanently disconnects the client by shutting down the
    /// underlying stream in a graceful manner (`AsyncDrop`).
    ///
    /// Dropping the client without explicitly disconnecting it
    /// beforehand should also work and free all resources.
    async fn disconnect(&mut self) -> io::Result<()>;
}

/// Asynchronous _Modbus_ reader
#[async_trait]
pub trait Reader: Client {
    /// Read multiple coils (0x01)
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple discrete inputs (0x02)
    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple holding registers (0x03)
    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read multiple input registers (0x04)
    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read and write multiple holding registers (0x17)
    ///
    /// The write operation is performed before the read unlike
    /// the name of the operation might suggest!
    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>>;

    /// Read the contents of a FIFO queue of registers (0x18)
    async fn read_fifo_queue(&mut self, addr: Address) -> Result<Vec<Word>>;

    /// Read file records (0x14)
    ///
    /// Returns the registers of each record in request order.
    async fn read_file_record(&mut self, records: &[FileRecordRequest]) -> Result<Vec<Vec<Word>>>;

    /// Read the eight exception status outputs (0x07, serial line only)
    async fn read_exception_status(&mut self) -> Result<u8>;

    /// Diagnostics (0x08, serial line only)
    ///
    /// Returns the echoed sub-function code and data word.
    async fn diagnostics(&mut self, sub_function: u16, data: Word) -> Result<(u16, Word)>;

    /// Get the status word and event count (0x0B, serial line only)
    async fn get_comm_event_counter(&mut self) -> Result<(Word, Word)>;

    /// Get the communication event log (0x0C, serial line only)
    async fn get_comm_event_log(&mut self) -> Result<CommEventLog>;

    /// Report the slave id, the run indicator and device specific data
    /// (0x11, serial line only)
    async fn report_slave_id(&mut self) -> Result<(u8, bool, Vec<u8>)>;

    /// Read device identification objects (0x2B / 0x0E)
    async fn read_device_identification(
        &mut self,
        read_code: ReadCode,
        object_id: ObjectId,
    ) -> Result<ReadDeviceIdentificationResponse>;
}

/// Asynchronous Modbus writer
#[async_trait]
pub trait Writer: Client {
    /// Write a single coil (0x05)
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()>;

    /// Write a single holding register (0x06)
    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()>;

    /// Write multiple coils (0x0F)
    async fn write_multiple_coils(&mut self, addr: Address, coils: &'_ [Coil]) -> Result<()>;

    /// Write multiple holding registers (0x10)
    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()>;

    /// Set or clear individual bits of a holding register (0x16)
    async fn masked_write_register(
        &mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()>;

    /// Write file records (0x15)
    async fn write_file_record(&mut self, records: &[FileRecord]) -> Result<()>;
}

/// Asynchronous Modbus client context
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
}

impl From<Box<dyn Client>> for Context {
    fn from(client: Box<dyn Client>) -> Self {
        Self { client }
    }
}

impl From<Context> for Box<dyn Client> {
    fn from(val: Context) -> Self {
        val.client
    }
}

fn mismatch(expected: FunctionCode, response: &Response) -> Error {
    ValidationError::FunctionCode {
        expected,
        actual: response.function_code(),
    }
    .into()
}

#[async_trait]
impl Client for Context {
    async fn call(&mut self, request: Request) -> Result<Response> {
        self.client.call(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.client.disconnect().await
    }
}

impl UnitContext for Context {
    fn set_unit(&mut self, unit: Unit) {
        self.client.set_unit(unit);
    }
}

#[async_trait]
impl Reader for Context {
    async fn read_coils<'a>(&'a mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        match self.client.call(Request::ReadCoils(addr, cnt)).await? {
            Response::ReadCoils(mut coils) => {
                coils.trim(cnt.into());
                Ok(coils.to_vec())
            }
            rsp => Err(mismatch(FunctionCode::ReadCoils, &rsp)),
        }
    }

    async fn read_discrete_inputs<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Coil>> {
        match self.client.call(Request::ReadDiscreteInputs(addr, cnt)).await? {
            Response::ReadDiscreteInputs(mut inputs) => {
                inputs.trim(cnt.into());
                Ok(inputs.to_vec())
            }
            rsp => Err(mismatch(FunctionCode::ReadDiscreteInputs, &rsp)),
        }
    }

    async fn read_holding_registers<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadHoldingRegisters(addr, cnt)).await? {
            Response::ReadHoldingRegisters(words) => {
                debug_assert_eq!(words.len(), cnt.into());
                Ok(words)
            }
            rsp => Err(mismatch(FunctionCode::ReadHoldingRegisters, &rsp)),
        }
    }

    async fn read_input_registers<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadInputRegisters(addr, cnt)).await? {
            Response::ReadInputRegisters(words) => {
                debug_assert_eq!(words.len(), cnt.into());
                Ok(words)
            }
            rsp => Err(mismatch(FunctionCode::ReadInputRegisters, &rsp)),
        }
    }

    async fn read_write_multiple_registers<'a>(
        &'a mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>> {
        let request = Request::ReadWriteMultipleRegisters(
            read_addr,
            read_count,
            write_addr,
            write_data.to_vec(),
        );
        match self.client.call(request).await? {
            Response::ReadWriteMultipleRegisters(words) => {
                debug_assert_eq!(words.len(), read_count.into());
                Ok(words)
            }
            rsp => Err(mismatch(FunctionCode::ReadWriteMultipleRegisters, &rsp)),
        }
    }

    async fn read_fifo_queue<'a>(&'a mut self, addr: Address) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadFifoQueue(addr)).await? {
            Response::ReadFifoQueue(words) => Ok(words),
            rsp => Err(mismatch(FunctionCode::ReadFifoQueue, &rsp)),
        }
    }

    async fn read_file_record<'a>(
        &'a mut self,
        records: &[FileRecordRequest],
    ) -> Result<Vec<Vec<Word>>> {
        match self.client.call(Request::ReadFileRecord(records.to_vec())).await? {
            Response::ReadFileRecord(records) => Ok(records),
            rsp => Err(mismatch(FunctionCode::ReadFileRecord, &rsp)),
        }
    }

    async fn read_exception_status<'a>(&'a mut self) -> Result<u8> {
        match self.client.call(Request::ReadExceptionStatus).await? {
            Response::ReadExceptionStatus(status) => Ok(status),
            rsp => Err(mismatch(FunctionCode::ReadExceptionStatus, &rsp)),
        }
    }

    async fn diagnostics<'a>(&'a mut self, sub_function: u16, data: Word) -> Result<(u16, Word)> {
        match self.client.call(Request::Diagnostics(sub_function, data)).await? {
            Response::Diagnostics(sub_function, data) => Ok((sub_function, data)),
            rsp => Err(mismatch(FunctionCode::Diagnostics, &rsp)),
        }
    }

    async fn get_comm_event_counter<'a>(&'a mut self) -> Result<(Word, Word)> {
        match self.client.call(Request::GetCommEventCounter).await? {
            Response::GetCommEventCounter(status, event_count) => Ok((status, event_count)),
            rsp => Err(mismatch(FunctionCode::GetCommEventCounter, &rsp)),
        }
    }

    async fn get_comm_event_log<'a>(&'a mut self) -> Result<CommEventLog> {
        match self.client.call(Request::GetCommEventLog).await? {
            Response::GetCommEventLog(log) => Ok(log),
            rsp => Err(mismatch(FunctionCode::GetCommEventLog, &rsp)),
        }
    }

    async fn report_slave_id<'a>(&'a mut self) -> Result<(u8, bool, Vec<u8>)> {
        match self.client.call(Request::ReportSlaveId).await? {
            Response::ReportSlaveId(slave_id, running, data) => Ok((slave_id, running, data)),
            rsp => Err(mismatch(FunctionCode::ReportSlaveId, &rsp)),
        }
    }

    async fn read_device_identification<'a>(
        &'a mut self,
        read_code: ReadCode,
        object_id: ObjectId,
    ) -> Result<ReadDeviceIdentificationResponse> {
        let request = Request::ReadDeviceIdentification(read_code, object_id);
        match self.client.call(request).await? {
            Response::ReadDeviceIdentification(identification) => Ok(identification),
            rsp => Err(mismatch(FunctionCode::EncapsulatedInterfaceTransport, &rsp)),
        }
    }
}

#[async_trait]
impl Writer for Context {
    async fn write_single_coil<'a>(&'a mut self, addr: Address, coil: Coil) -> Result<()> {
        match self.client.call(Request::WriteSingleCoil(addr, coil)).await? {
            Response::WriteSingleCoil(rsp_addr, rsp_coil) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(coil, rsp_coil);
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::WriteSingleCoil, &rsp)),
        }
    }

    async fn write_single_register<'a>(&'a mut self, addr: Address, word: Word) -> Result<()> {
        match self.client.call(Request::WriteSingleRegister(addr, word)).await? {
            Response::WriteSingleRegister(rsp_addr, rsp_word) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(word, rsp_word);
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::WriteSingleRegister, &rsp)),
        }
    }

    async fn write_multiple_coils<'a>(&'a mut self, addr: Address, coils: &[Coil]) -> Result<()> {
        let cnt = coils.len();
        let request = Request::WriteMultipleCoils(addr, coils.into());
        match self.client.call(request).await? {
            Response::WriteMultipleCoils(rsp_addr, rsp_cnt) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(cnt, rsp_cnt.into());
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::WriteMultipleCoils, &rsp)),
        }
    }

    async fn write_multiple_registers<'a>(
        &'a mut self,
        addr: Address,
        words: &[Word],
    ) -> Result<()> {
        let cnt = words.len();
        let request = Request::WriteMultipleRegisters(addr, words.to_vec());
        match self.client.call(request).await? {
            Response::WriteMultipleRegisters(rsp_addr, rsp_cnt) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(cnt, rsp_cnt.into());
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::WriteMultipleRegisters, &rsp)),
        }
    }

    async fn masked_write_register<'a>(
        &'a mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()> {
        let request = Request::MaskWriteRegister(addr, and_mask, or_mask);
        match self.client.call(request).await? {
            Response::MaskWriteRegister(rsp_addr, rsp_and_mask, rsp_or_mask) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(and_mask, rsp_and_mask);
                debug_assert_eq!(or_mask, rsp_or_mask);
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::MaskWriteRegister, &rsp)),
        }
    }

    async fn write_file_record<'a>(&'a mut self, records: &[FileRecord]) -> Result<()> {
        match self.client.call(Request::WriteFileRecord(records.to_vec())).await? {
            Response::WriteFileRecord(echo) => {
                debug_assert_eq!(records, &echo[..]);
                Ok(())
            }
            rsp => Err(mismatch(FunctionCode::WriteFileRecord, &rsp)),
        }
    }
}
