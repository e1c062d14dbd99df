// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;

use crate::{
    codec::{request_pdu_len, response_result_pdu_len},
    consts::PROTOCOL_ID,
    unit::UnitId,
};

pub type TransactionId = u16;

/// Envelope fields shared by all messages.
///
/// Transaction and protocol identifiers only travel on the wire if the
/// message is not `headless`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub protocol_id: u16,
    pub unit_id: UnitId,
    pub headless: bool,
}

impl Header {
    /// Header of a message with MBAP fields.
    #[must_use]
    pub const fn new(transaction_id: TransactionId, unit_id: UnitId) -> Self {
        Self {
            transaction_id,
            protocol_id: PROTOCOL_ID,
            unit_id,
            headless: false,
        }
    }

    /// Header of a message on a serial line or RTU over TCP.
    #[must_use]
    pub const fn headless(unit_id: UnitId) -> Self {
        Self {
            transaction_id: 0,
            protocol_id: PROTOCOL_ID,
            unit_id,
            headless: true,
        }
    }

    /// The header of the answer to a message with this header.
    #[must_use]
    pub const fn reply(&self) -> Self {
        if self.headless {
            Self::headless(self.unit_id)
        } else {
            *self
        }
    }
}

/// A complete message: header plus request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<B> {
    pub header: Header,
    pub body: B,
}

pub type RequestMessage = Message<Request>;

pub type ResponseMessage = Message<ResponsePdu>;

/// `length` field of the MBAP header for a PDU of `pdu_len` bytes.
///
/// The function code is part of the PDU, the unit identifier is added.
#[allow(clippy::cast_possible_truncation)]
fn data_length(pdu_len: usize) -> u16 {
    debug_assert!(pdu_len < usize::from(u16::MAX));
    (pdu_len + 1) as u16
}

impl RequestMessage {
    #[must_use]
    pub const fn new(header: Header, request: Request) -> Self {
        Self {
            header,
            body: request,
        }
    }

    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        self.body.function_code()
    }

    /// Number of bytes following the length field: payload + unit id + function code.
    #[must_use]
    pub fn data_length(&self) -> u16 {
        data_length(request_pdu_len(&self.body))
    }

    /// Answers this request with `exception`.
    ///
    /// The function code gets the exception flag `0x80` on the wire.
    #[must_use]
    pub fn create_exception_response(&self, exception: ExceptionCode) -> ResponseMessage {
        self.create_response(Err(exception))
    }

    /// Answers this request with the result of executing it.
    #[must_use]
    pub fn create_response(&self, result: Result<Response, ExceptionCode>) -> ResponseMessage {
        let function = self.function_code();
        let pdu = result
            .map_err(|exception| ExceptionResponse {
                function,
                exception,
            })
            .into();
        ResponseMessage {
            header: self.header.reply(),
            body: ResponsePdu(pdu),
        }
    }
}

impl ResponseMessage {
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        self.body.function_code()
    }

    #[must_use]
    pub fn data_length(&self) -> u16 {
        data_length(response_result_pdu_len(&self.body.0))
    }

    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.body.is_exception()
    }
}
