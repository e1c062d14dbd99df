// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attaching a Modbus RTU context to a serial line

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    transaction::SerialTransaction,
    transport::{serial::Encoding, SerialConfig, SerialTransport},
    unit::Unit,
};

use super::{Client, Context};

/// Attach to no particular Modbus slave device for sending
/// broadcast messages.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug + 'static,
{
    attach_unit(transport, Unit::broadcast())
}

/// Attach to any kind of Modbus slave device.
pub fn attach_unit<T>(transport: T, unit: Unit) -> Context
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug + 'static,
{
    attach_with_config(transport, SerialConfig::default(), unit)
}

/// Attach with custom line parameters, the encoding of `config` is ignored.
pub fn attach_with_config<T>(transport: T, config: SerialConfig, unit: Unit) -> Context
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug + 'static,
{
    let transport = SerialTransport::client(transport, config.encoding(Encoding::Rtu));
    let client = SerialTransaction::new(transport, unit);
    Context::from(Box::new(client) as Box<dyn Client>)
}

/// Open a native serial port and attach to the slave device `unit`.
#[cfg(feature = "serial-port")]
pub fn open_unit(path: &str, config: SerialConfig, unit: Unit) -> std::io::Result<Context> {
    let port = crate::transport::serial::open_port(path, &config)?;
    Ok(attach_with_config(port, config, unit))
}
