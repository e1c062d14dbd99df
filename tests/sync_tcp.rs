// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execute this test only if the `sync` feature is selected.

#![cfg(feature = "sync")]

mod common;

use std::sync::mpsc;

use modbus_engine::{
    client::sync::{self, Reader as _, Writer as _},
    Unit,
};

use crate::common::{image, start_tcp_server, UNIT_ID};

#[test]
fn blocking_master_against_tcp_slave() -> anyhow::Result<()> {
    // Given
    let (addr_tx, addr_rx) = mpsc::channel();
    std::thread::spawn(move || -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async move {
            let socket_addr = start_tcp_server(image(), false).await?;
            addr_tx.send(socket_addr)?;
            std::future::pending::<anyhow::Result<()>>().await
        })
    });
    let socket_addr = addr_rx.recv()?;
    let mut ctx = sync::tcp::connect_unit(socket_addr, Unit(UNIT_ID))?;

    // When
    ctx.write_multiple_registers(0, &[7, 8, 9])?;
    let words = ctx.read_holding_registers(0, 3)?;

    // Then
    assert_eq!(words, vec![7, 8, 9]);
    Ok(())
}
