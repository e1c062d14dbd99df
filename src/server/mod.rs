// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus servers (slaves)
//!
//! Every server decodes requests, hands them to a [`Service`] and sends
//! back what the service answers. [`RequestProcessor`] is a service that
//! answers from the [`ProcessImage`](crate::image::ProcessImage) of the
//! addressed unit.

mod processor;
pub use self::processor::{ProcessorConfig, RequestProcessor};

pub mod serial;
pub mod tcp;
pub mod udp;

use std::{future::Future, ops::Deref};

use crate::{
    frame::{
        ExceptionCode, ExceptionResponse, Request, RequestMessage, Response, ResponseMessage,
        ResponsePdu,
    },
    unit::UnitId,
};

/// A Modbus server service.
pub trait Service {
    /// Requests handled by the service.
    type Request;

    /// Responses sent by the service.
    ///
    /// Services that sometimes stay silent use `Option<Response>`.
    type Response;

    /// Exceptional responses sent by the service.
    type Exception;

    /// The future response value.
    type Future: Future<Output = Result<Self::Response, Self::Exception>> + Send;

    /// Process the request and return the response asynchronously.
    fn call(&self, req: Self::Request) -> Self::Future;
}

impl<D> Service for D
where
    D: Deref + ?Sized,
    D::Target: Service,
{
    type Request = <D::Target as Service>::Request;
    type Response = <D::Target as Service>::Response;
    type Exception = <D::Target as Service>::Exception;
    type Future = <D::Target as Service>::Future;

    /// A forwarding blanket impl to support smart pointers around [`Service`].
    fn call(&self, req: Self::Request) -> Self::Future {
        self.deref().call(req)
    }
}

/// A request together with the unit it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRequest {
    pub unit_id: UnitId,
    pub request: Request,
}

impl From<SlaveRequest> for Request {
    fn from(from: SlaveRequest) -> Self {
        from.request
    }
}

impl From<RequestMessage> for SlaveRequest {
    fn from(from: RequestMessage) -> Self {
        Self {
            unit_id: from.header.unit_id,
            request: from.body,
        }
    }
}

/// How a server stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    /// The peer or the listener finished.
    Finished,
    /// The abort signal has been received.
    Aborted,
}

/// Passes `message` to `service` and builds the response message.
///
/// Returns `None` if the service doesn't answer.
pub(crate) async fn dispatch<S>(service: &S, message: RequestMessage) -> Option<ResponseMessage>
where
    S: Service,
    S::Request: From<SlaveRequest>,
    S::Response: Into<Option<Response>>,
    S::Exception: Into<ExceptionCode>,
{
    let header = message.header;
    let function = message.function_code();
    log::debug!("Received {:?} for unit {}", message.body, header.unit_id);
    let body = match service.call(SlaveRequest::from(message).into()).await {
        Ok(response) => {
            let response: Option<Response> = response.into();
            let Some(response) = response else {
                log::debug!("No response to function {function}");
                return None;
            };
            Ok(response)
        }
        Err(exception) => {
            let exception: ExceptionCode = exception.into();
            log::debug!("Answering function {function} with exception: {exception}");
            Err(ExceptionResponse {
                function,
                exception,
            })
        }
    };
    Some(ResponseMessage {
        header: header.reply(),
        body: ResponsePdu(body),
    })
}
