// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use modbus_engine::{
    client::{Context, Reader as _, Writer as _},
    image::{DeviceIdentification, SimpleProcessImage},
    server::{self, tcp::accept_tcp_connection, ProcessorConfig, RequestProcessor},
    Error, FramingError,
};

pub const UNIT_ID: u8 = 1;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An image with some data in every table.
pub fn image() -> Arc<SimpleProcessImage> {
    let image = SimpleProcessImage::with_sizes(16, 16, 16, 16);
    image
        .set_coils(0, &[true, false, true, true])
        .expect("coils");
    image
        .set_discrete_inputs(0, &[false, true])
        .expect("discrete inputs");
    image
        .set_input_registers(0, &[0x1111, 0x2222, 0x3333])
        .expect("input registers");
    image
        .set_holding_registers(0, &[0x000A, 0x000B, 0x000C])
        .expect("holding registers");
    image.set_fifo_queue(0x04DE, [0x01B8, 0x1284]);
    image.set_file_record(4, 1, vec![0x0DFE, 0x0020]);
    image.set_file_record(4, 7, vec![0; 3]);
    image.set_device_identification(DeviceIdentification::basic("slowtec", "engine", "v1"));
    Arc::new(image)
}

/// An image covering the whole address space of every table.
pub fn full_image() -> Arc<SimpleProcessImage> {
    const SIZE: usize = 0x1_0000;
    Arc::new(SimpleProcessImage::with_sizes(SIZE, SIZE, SIZE, SIZE))
}

/// Exchanges the largest requests and responses that fit into a frame,
/// at the very end of the address space.
pub async fn check_largest_messages(ctx: &mut Context) -> anyhow::Result<()> {
    // 123 registers up to the last address
    let words = (0..123).map(|i| 0x0100 + i).collect::<Vec<u16>>();
    ctx.write_multiple_registers(0xFFFF - 122, &words).await?;
    assert_eq!(ctx.read_holding_registers(0xFFFF - 124, 125).await?[2..], words[..]);

    // 121 registers written while reading 125
    let words = vec![0x5A5A; 121];
    let read = ctx
        .read_write_multiple_registers(0, 125, 0xFFFF - 120, &words)
        .await?;
    assert_eq!(read.len(), 125);
    assert_eq!(ctx.read_holding_registers(0xFFFF, 1).await?, vec![0x5A5A]);

    ctx.masked_write_register(0xFFFF, 0x00FF, 0xA500).await?;
    assert_eq!(ctx.read_holding_registers(0xFFFF, 1).await?, vec![0xA55A]);

    // 1968 coils are the most that fit into a write request
    let coils = (0..1968).map(|i| i % 3 == 0).collect::<Vec<_>>();
    ctx.write_multiple_coils(0xFFFF - 1967, &coils).await?;
    let read = ctx.read_coils(0xFFFF - 1999, 2000).await?;
    assert_eq!(read.len(), 2000);
    assert_eq!(read[32..], coils[..]);
    assert_eq!(ctx.read_discrete_inputs(0xFFFF - 1999, 2000).await?.len(), 2000);

    let err = ctx
        .write_multiple_coils(0, &[true; 2000])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Framing(FramingError::MessageTooLong(_))));
    Ok(())
}

pub fn processor(image: Arc<SimpleProcessImage>) -> RequestProcessor {
    RequestProcessor::new(ProcessorConfig::default()).with_image(UNIT_ID, image)
}

/// Starts a TCP slave on an ephemeral port.
pub async fn start_tcp_server(
    image: Arc<SimpleProcessImage>,
    headless: bool,
) -> anyhow::Result<SocketAddr> {
    let server = server::tcp::Server::bind("127.0.0.1:0".parse()?)?.headless(headless);
    let socket_addr = server.local_addr()?;
    tokio::spawn(async move {
        let new_service = |_socket_addr| Ok(Some(processor(Arc::clone(&image))));
        let on_connected = |stream, socket_addr| async move {
            accept_tcp_connection(stream, socket_addr, new_service)
        };
        server
            .serve(&on_connected, |err| log::error!("{err}"))
            .await
    });
    Ok(socket_addr)
}

/// Starts a UDP slave on an ephemeral port.
pub async fn start_udp_server(image: Arc<SimpleProcessImage>) -> anyhow::Result<SocketAddr> {
    let mut server = server::udp::Server::bind("127.0.0.1:0".parse()?).await?;
    let socket_addr = server.local_addr();
    tokio::spawn(async move { server.serve(&processor(image)).await });
    Ok(socket_addr)
}
