// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connecting a Modbus UDP context

use std::net::SocketAddr;

use crate::{
    transaction::{TransactionConfig, TransactionIds, UdpTransaction},
    transport::{Connection as _, UdpConfig, UdpTransport},
    unit::Unit,
    Result,
};

use super::{Client, Context};

/// Activate a terminal for a directly addressed Modbus UDP device.
pub async fn connect(socket_addr: SocketAddr) -> Result<Context> {
    connect_unit(socket_addr, Unit::tcp_device()).await
}

/// Activate a terminal for the device `unit` behind `socket_addr`.
pub async fn connect_unit(socket_addr: SocketAddr, unit: Unit) -> Result<Context> {
    connect_with_config(UdpConfig::new(socket_addr), unit, TransactionConfig::default()).await
}

pub async fn connect_with_config(
    config: UdpConfig,
    unit: Unit,
    transaction: TransactionConfig,
) -> Result<Context> {
    let mut terminal = UdpTransport::new(config);
    terminal.connect().await?;
    let client = UdpTransaction::with_config(terminal, unit, transaction, TransactionIds::new());
    Ok(Context::from(Box::new(client) as Box<dyn Client>))
}
