// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attaching a Modbus ASCII context to a serial line

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
    let transport = SerialTransport::client(transport, config.encoding(Encoding::Ascii));
    let client = SerialTransaction::new(transport, unit);
    Context::from(Box::new(client) as Box<dyn Client>)
}

#[cfg(feature = "serial-port")]
pub fn open_unit(path: &str, config: SerialConfig, unit: Unit) -> std::io::Result<Context> {
    let port = crate::transport::serial::open_port(path, &config)?;
    Ok(attach_with_config(port, config, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _};

    use crate::client::Reader as _;

    #[tokio::test]
    async fn read_holding_registers_over_ascii() -> anyhow::Result<()> {
        // Given
        let (io, mut slave) = duplex(64);
        let mut context = attach_unit(io, Unit(0x11));
        let answer = tokio::spawn(async move {
            let mut request = [0; 17];
            slave.read_exact(&mut request).await?;
            slave.write_all(b":110302006486\r\n").await?;
            anyhow::Ok(request)
        });

        // When
        let words = context.read_holding_registers(0x006B, 1).await?;

        // Then
        assert_eq!(words, vec![0x0064]);
        assert_eq!(&answer.await??, b":1103006B000180\r\n");
        Ok(())
    }
}
