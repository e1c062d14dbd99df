// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future;

use modbus_engine::{
    client::{Context, Reader as _, Writer as _},
    server::Service,
    ExceptionCode, Request, Response,
};

pub struct TestService {}

impl TestService {
    fn handle(&self, req: Request) -> Result<Response, ExceptionCode> {
        use Request::*;

        match req {
            ReadCoils(_, _) => Err(ExceptionCode::Acknowledge),
            ReadDiscreteInputs(_, _) => Err(ExceptionCode::GatewayPathUnavailable),
            WriteSingleCoil(_, _) => Err(ExceptionCode::GatewayTargetDevice),
            WriteMultipleCoils(_, _) => Err(ExceptionCode::IllegalDataAddress),
            ReadInputRegisters(_, _) => Err(ExceptionCode::IllegalDataValue),
            ReadHoldingRegisters(_, _) => Err(ExceptionCode::IllegalFunction),
            WriteSingleRegister(_, _) => Err(ExceptionCode::MemoryParityError),
            WriteMultipleRegisters(_, _) => Err(ExceptionCode::SlaveDeviceBusy),
            MaskWriteRegister(_, _, _) => Err(ExceptionCode::SlaveDeviceFailure),
            ReadFifoQueue(_) => Err(ExceptionCode::NegativeAcknowledge),
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }
}

impl Service for TestService {
    type Request = Request;

    type Response = Response;

    type Exception = ExceptionCode;

    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}

fn exception(err: &modbus_engine::Error) -> Option<ExceptionCode> {
    err.exception().map(|rsp| rsp.exception)
}

pub async fn check_client_context(mut ctx: Context) {
    let err = ctx.read_coils(0x00, 2).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::Acknowledge));

    let err = ctx.read_discrete_inputs(0x00, 2).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::GatewayPathUnavailable));

    let err = ctx.write_single_coil(0x00, true).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::GatewayTargetDevice));

    let err = ctx.write_multiple_coils(0x00, &[true]).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::IllegalDataAddress));

    let err = ctx.read_input_registers(0x00, 2).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::IllegalDataValue));

    let err = ctx.read_holding_registers(0x00, 2).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::IllegalFunction));

    let err = ctx.write_single_register(0x00, 42).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::MemoryParityError));

    let err = ctx.write_multiple_registers(0x00, &[42]).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::SlaveDeviceBusy));

    let err = ctx.masked_write_register(0x00, 0, 0).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::SlaveDeviceFailure));

    let err = ctx.read_fifo_queue(0x00).await.unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::NegativeAcknowledge));

    let err = ctx
        .read_write_multiple_registers(0x00, 0, 0, &[42])
        .await
        .unwrap_err();
    assert_eq!(exception(&err), Some(ExceptionCode::IllegalFunction));
}
