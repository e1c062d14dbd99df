// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::net::SocketAddr;

use crate::{client::udp as async_udp, unit::Unit, Result};

use super::Context;

pub fn connect(socket_addr: SocketAddr) -> Result<Context> {
    connect_unit(socket_addr, Unit::tcp_device())
}

pub fn connect_unit(socket_addr: SocketAddr, unit: Unit) -> Result<Context> {
    Context::connect(async_udp::connect_unit(socket_addr, unit))
}
