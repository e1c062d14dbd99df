// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{client::ascii as async_ascii, transport::SerialConfig, unit::Unit};

use super::Context;

/// Attach to any kind of Modbus slave device on an ASCII line.
///
/// `new_transport` is called within the runtime of the context, which
/// is required for constructing Tokio I/O types.
pub fn attach_unit<T, F>(new_transport: F, config: SerialConfig, unit: Unit) -> io::Result<Context>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug + 'static,
    F: FnOnce() -> io::Result<T>,
{
    Context::attach(|| {
        let transport = new_transport()?;
        Ok(async_ascii::attach_with_config(transport, config, unit))
    })
}

/// Open a native serial port and attach to the slave device `unit`.
#[cfg(feature = "serial-port")]
pub fn open_unit(path: &str, config: SerialConfig, unit: Unit) -> io::Result<Context> {
    Context::attach(|| async_ascii::open_unit(path, config, unit))
}
