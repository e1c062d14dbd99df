// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::net::SocketAddr;

use crate::{client::tcp as async_tcp, unit::Unit, Result};

use super::Context;

/// Establish a direct connection to a Modbus TCP coupler.
pub fn connect(socket_addr: SocketAddr) -> Result<Context> {
    connect_unit(socket_addr, Unit::tcp_device())
}

/// Connect to any kind of Modbus slave device, probably through a Modbus TCP/RTU
/// gateway that is forwarding messages to/from the corresponding unit.
pub fn connect_unit(socket_addr: SocketAddr, unit: Unit) -> Result<Context> {
    Context::connect(async_tcp::connect_unit(socket_addr, unit))
}
