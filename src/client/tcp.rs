// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connecting a Modbus TCP context

use std::net::SocketAddr;

use crate::{
    transaction::{TcpTransaction, TransactionConfig, TransactionIds},
    transport::{Connection as _, TcpConfig, TcpTransport},
    unit::Unit,
    Result,
};

use super::{Client, Context};

/// Establish a direct connection to a Modbus TCP coupler.
pub async fn connect(socket_addr: SocketAddr) -> Result<Context> {
    connect_unit(socket_addr, Unit::tcp_device()).await
}

/// Connect to a physical, broadcast, or custom Modbus device,
/// probably through a Modbus TCP gateway that is forwarding
/// messages to/from the corresponding unit.
pub async fn connect_unit(socket_addr: SocketAddr, unit: Unit) -> Result<Context> {
    connect_with_config(TcpConfig::new(socket_addr), unit, TransactionConfig::default()).await
}

/// Connect with custom framing and retry behavior.
///
/// Set [`TcpConfig::headless`] to talk RTU over TCP.
pub async fn connect_with_config(
    config: TcpConfig,
    unit: Unit,
    transaction: TransactionConfig,
) -> Result<Context> {
    let mut transport = TcpTransport::new(config);
    transport.connect().await?;
    let client = TcpTransaction::with_config(transport, unit, transaction, TransactionIds::new());
    Ok(Context::from(Box::new(client) as Box<dyn Client>))
}
