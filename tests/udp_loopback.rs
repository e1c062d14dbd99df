// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::sync::Arc;

use modbus_engine::{
    client::{self, Reader as _, Writer as _},
    ExceptionCode, Unit,
};

use crate::common::{
    check_largest_messages, full_image, image, init_logger, start_udp_server, UNIT_ID,
};

#[tokio::test]
async fn udp_master_against_udp_slave() -> anyhow::Result<()> {
    init_logger();

    // Given
    let image = image();
    let socket_addr = start_udp_server(Arc::clone(&image)).await?;
    let mut ctx = client::udp::connect_unit(socket_addr, Unit(UNIT_ID)).await?;

    // When
    ctx.write_single_register(1, 0x0101).await?;
    let words = ctx.read_holding_registers(0, 3).await?;
    let inputs = ctx.read_input_registers(2, 1).await?;

    // Then
    assert_eq!(words, vec![0x000A, 0x0101, 0x000C]);
    assert_eq!(inputs, vec![0x3333]);
    Ok(())
}

#[tokio::test]
async fn exception_over_udp() -> anyhow::Result<()> {
    let socket_addr = start_udp_server(image()).await?;
    let mut ctx = client::udp::connect_unit(socket_addr, Unit(UNIT_ID)).await?;

    let err = ctx.read_fifo_queue(0x0001).await.unwrap_err();

    assert_eq!(
        err.exception().map(|rsp| rsp.exception),
        Some(ExceptionCode::IllegalDataAddress)
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_masters_get_their_own_responses() -> anyhow::Result<()> {
    // Given
    let socket_addr = start_udp_server(image()).await?;
    let mut first = client::udp::connect_unit(socket_addr, Unit(UNIT_ID)).await?;
    let mut second = client::udp::connect_unit(socket_addr, Unit(UNIT_ID)).await?;
    // Both masters start with the same transaction id, which the slave
    // can't tell apart
    first.read_coils(0, 1).await?;

    // When
    let (first_words, second_inputs) = tokio::join!(
        first.read_holding_registers(0, 1),
        second.read_input_registers(0, 1)
    );

    // Then
    assert_eq!(first_words?, vec![0x000A]);
    assert_eq!(second_inputs?, vec![0x1111]);
    Ok(())
}

#[tokio::test]
async fn largest_messages_over_udp() -> anyhow::Result<()> {
    init_logger();

    // Given
    let socket_addr = start_udp_server(full_image()).await?;
    let mut ctx = client::udp::connect_unit(socket_addr, Unit(UNIT_ID)).await?;

    // When / Then
    check_largest_messages(&mut ctx).await
}
