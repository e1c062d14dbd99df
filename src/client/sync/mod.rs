// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous Modbus context access
//!
//! Every context drives its asynchronous counterpart on a private
//! current-thread runtime. Don't use it from within another runtime.

pub mod ascii;
pub mod rtu;
pub mod tcp;
pub mod udp;

use std::{future::Future, io};

use tokio::runtime::{Builder, Runtime};

use super::{
    Client as AsyncClient, Context as AsyncContext, Reader as AsyncReader, Writer as AsyncWriter,
};

use crate::{
    frame::*,
    unit::{Unit, UnitContext},
    Result,
};

/// A transport independent synchronous client trait.
pub trait Client: UnitContext {
    fn call(&mut self, req: Request) -> Result<Response>;

    fn disconnect(&mut self) -> io::Result<()>;
}

/// A transport independent synchronous reader trait.
pub trait Reader: Client {
    fn read_coils(&mut self, _: Address, _: Quantity) -> Result<Vec<Coil>>;
    fn read_discrete_inputs(&mut self, _: Address, _: Quantity) -> Result<Vec<Coil>>;
    fn read_input_registers(&mut self, _: Address, _: Quantity) -> Result<Vec<Word>>;
    fn read_holding_registers(&mut self, _: Address, _: Quantity) -> Result<Vec<Word>>;
    fn read_write_multiple_registers(
        &mut self,
        _: Address,
        _: Quantity,
        _: Address,
        _: &[Word],
    ) -> Result<Vec<Word>>;
    fn read_fifo_queue(&mut self, _: Address) -> Result<Vec<Word>>;
    fn read_file_record(&mut self, _: &[FileRecordRequest]) -> Result<Vec<Vec<Word>>>;
    fn read_exception_status(&mut self) -> Result<u8>;
    fn diagnostics(&mut self, _: u16, _: Word) -> Result<(u16, Word)>;
    fn get_comm_event_counter(&mut self) -> Result<(Word, Word)>;
    fn get_comm_event_log(&mut self) -> Result<CommEventLog>;
    fn report_slave_id(&mut self) -> Result<(u8, bool, Vec<u8>)>;
    fn read_device_identification(
        &mut self,
        _: ReadCode,
        _: ObjectId,
    ) -> Result<ReadDeviceIdentificationResponse>;
}

/// A transport independent synchronous writer trait.
pub trait Writer: Client {
    fn write_single_coil(&mut self, _: Address, _: Coil) -> Result<()>;
    fn write_multiple_coils(&mut self, _: Address, _: &[Coil]) -> Result<()>;
    fn write_single_register(&mut self, _: Address, _: Word) -> Result<()>;
    fn write_multiple_registers(&mut self, _: Address, _: &[Word]) -> Result<()>;
    fn masked_write_register(&mut self, _: Address, _: Word, _: Word) -> Result<()>;
    fn write_file_record(&mut self, _: &[FileRecord]) -> Result<()>;
}

fn runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// A synchronous Modbus client context.
#[derive(Debug)]
pub struct Context {
    runtime: Runtime,
    async_ctx: AsyncContext,
}

impl Context {
    /// Runs `connect` to completion and wraps the resulting context.
    fn connect<F>(connect: F) -> Result<Self>
    where
        F: Future<Output = Result<AsyncContext>>,
    {
        let runtime = runtime()?;
        let async_ctx = runtime.block_on(connect)?;
        Ok(Self { runtime, async_ctx })
    }

    /// Wraps a context whose transport doesn't depend on a runtime.
    fn attach(attach: impl FnOnce() -> io::Result<AsyncContext>) -> io::Result<Self> {
        let runtime = runtime()?;
        // Tokio I/O types register with the runtime on construction
        let async_ctx = {
            let _guard = runtime.enter();
            attach()?
        };
        Ok(Self { runtime, async_ctx })
    }
}

impl Client for Context {
    fn call(&mut self, req: Request) -> Result<Response> {
        self.runtime.block_on(self.async_ctx.call(req))
    }

    fn disconnect(&mut self) -> io::Result<()> {
        self.runtime.block_on(self.async_ctx.disconnect())
    }
}

impl UnitContext for Context {
    fn set_unit(&mut self, unit: Unit) {
        self.async_ctx.set_unit(unit);
    }
}

impl Reader for Context {
    fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        self.runtime.block_on(self.async_ctx.read_coils(addr, cnt))
    }

    fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        self.runtime
            .block_on(self.async_ctx.read_discrete_inputs(addr, cnt))
    }

    fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.runtime
            .block_on(self.async_ctx.read_input_registers(addr, cnt))
    }

    fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.runtime
            .block_on(self.async_ctx.read_holding_registers(addr, cnt))
    }

    fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_cnt: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>> {
        self.runtime.block_on(
            self.async_ctx
                .read_write_multiple_registers(read_addr, read_cnt, write_addr, write_data),
        )
    }

    fn read_fifo_queue(&mut self, addr: Address) -> Result<Vec<Word>> {
        self.runtime.block_on(self.async_ctx.read_fifo_queue(addr))
    }

    fn read_file_record(&mut self, records: &[FileRecordRequest]) -> Result<Vec<Vec<Word>>> {
        self.runtime.block_on(self.async_ctx.read_file_record(records))
    }

    fn read_exception_status(&mut self) -> Result<u8> {
        self.runtime.block_on(self.async_ctx.read_exception_status())
    }

    fn diagnostics(&mut self, sub_function: u16, data: Word) -> Result<(u16, Word)> {
        self.runtime
            .block_on(self.async_ctx.diagnostics(sub_function, data))
    }

    fn get_comm_event_counter(&mut self) -> Result<(Word, Word)> {
        self.runtime.block_on(self.async_ctx.get_comm_event_counter())
    }

    fn get_comm_event_log(&mut self) -> Result<CommEventLog> {
        self.runtime.block_on(self.async_ctx.get_comm_event_log())
    }

    fn report_slave_id(&mut self) -> Result<(u8, bool, Vec<u8>)> {
        self.runtime.block_on(self.async_ctx.report_slave_id())
    }

    fn read_device_identification(
        &mut self,
        read_code: ReadCode,
        object_id: ObjectId,
    ) -> Result<ReadDeviceIdentificationResponse> {
        self.runtime
            .block_on(self.async_ctx.read_device_identification(read_code, object_id))
    }
}

impl Writer for Context {
    fn write_single_register(&mut self, addr: Address, data: Word) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.write_single_register(addr, data))
    }

    fn write_multiple_registers(&mut self, addr: Address, data: &[Word]) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.write_multiple_registers(addr, data))
    }

    fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.write_single_coil(addr, coil))
    }

    fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.write_multiple_coils(addr, coils))
    }

    fn masked_write_register(&mut self, addr: Address, and_mask: Word, or_mask: Word) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.masked_write_register(addr, and_mask, or_mask))
    }

    fn write_file_record(&mut self, records: &[FileRecord]) -> Result<()> {
        self.runtime
            .block_on(self.async_ctx.write_file_record(records))
    }
}
