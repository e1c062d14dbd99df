// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    client::Client,
    frame::{Header, Request, RequestMessage, Response},
    transport::Connection,
    unit::{Unit, UnitContext, UnitId},
    Result,
};

use super::{
    back_off, check_request, enter, exchange, exhausted, State, TransactionConfig, TransactionIds,
};

/// Executor for connection oriented transports.
///
/// The connection is opened lazily and closed after every failed attempt,
/// so that the next attempt starts with a fresh connection.
#[derive(Debug)]
pub struct TcpTransaction<C> {
    connection: Arc<Mutex<C>>,
    ids: TransactionIds,
    config: TransactionConfig,
    unit_id: UnitId,
}

impl<C> TcpTransaction<C>
where
    C: Connection,
{
    pub fn new(connection: C, unit: Unit) -> Self {
        Self::with_config(connection, unit, TransactionConfig::default(), TransactionIds::new())
    }

    pub fn with_config(
        connection: C,
        unit: Unit,
        config: TransactionConfig,
        ids: TransactionIds,
    ) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            ids,
            config,
            unit_id: unit.into(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TransactionConfig {
        &self.config
    }

    #[must_use]
    pub const fn transaction_ids(&self) -> &TransactionIds {
        &self.ids
    }

    async fn attempt(&self, request: &Request, attempt: u32) -> Result<Response> {
        let mut connection = self.connection.lock().await;
        if !connection.is_connected() {
            connection.connect().await?;
        }
        let header = if connection.is_headless() {
            Header::headless(self.unit_id)
        } else {
            Header::new(self.ids.current(), self.unit_id)
        };
        let message = RequestMessage::new(header, request.clone());
        exchange(&mut *connection, &message, &self.config, attempt).await
    }

    async fn close(&self) {
        if let Err(err) = self.connection.lock().await.close().await {
            log::debug!("Failed to close connection: {err}");
        }
    }

    fn advance_transaction_id(&self) {
        if self.config.validity_check {
            self.ids.increment();
        }
    }

    /// Sends the request and waits for the matching response.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        check_request(&request)?;
        let attempts = self.config.attempts();
        let mut attempt = 1;
        enter(State::Idle, attempt);
        loop {
            match self.attempt(&request, attempt).await {
                Ok(response) => {
                    enter(State::Done, attempt);
                    if self.config.reconnecting {
                        self.close().await;
                    }
                    self.advance_transaction_id();
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => {
                    enter(State::Failed, attempt);
                    self.advance_transaction_id();
                    return Err(err);
                }
                Err(err) => {
                    if attempt >= attempts {
                        enter(State::Failed, attempt);
                        self.close().await;
                        return Err(exhausted(attempts, err));
                    }
                    enter(State::Retrying, attempt);
                    back_off(attempt, &err).await;
                    self.close().await;
                    self.advance_transaction_id();
                    attempt += 1;
                }
            }
        }
    }
}

impl<C> UnitContext for TcpTransaction<C> {
    fn set_unit(&mut self, unit: Unit) {
        self.unit_id = unit.into();
    }
}

#[async_trait]
impl<C> Client for TcpTransaction<C>
where
    C: Connection + 'static,
{
    async fn call(&mut self, request: Request) -> Result<Response> {
        self.execute(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.connection.lock().await.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{frame::*, transaction::mock::MockConnection, BitVector, Error, ValidationError};

    fn answer(request: &RequestMessage, response: Response) -> Option<Result<crate::ResponseMessage>> {
        Some(Ok(request.create_response(Ok(response))))
    }

    #[tokio::test(start_paused = true)]
    async fn failing_transport_is_written_retries_plus_one_times() {
        // Given
        let config = TransactionConfig::default().retries(2);
        let executor =
            TcpTransaction::with_config(MockConnection::silent(), Unit(1), config, TransactionIds::new());

        // When
        let err = executor.execute(Request::ReadHoldingRegisters(0, 1)).await.unwrap_err();

        // Then
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        let connection = executor.connection.lock().await;
        assert_eq!(connection.requests.len(), 3);
        assert_eq!(connection.connects, 3);
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn read_coils_yields_requested_number_of_bits() {
        let connection = MockConnection::new(|request| {
            answer(request, Response::ReadCoils(BitVector::from_bytes(&[0xFF, 0x03])))
        });
        let executor = TcpTransaction::new(connection, Unit(1));

        let response = executor.execute(Request::ReadCoils(0, 10)).await.unwrap();

        let Response::ReadCoils(coils) = response else {
            unreachable!();
        };
        assert_eq!(coils.size(), 10);
    }

    #[tokio::test]
    async fn exception_is_not_retried() {
        // Given
        let connection = MockConnection::new(|request| {
            Some(Ok(request.create_exception_response(ExceptionCode::IllegalDataAddress)))
        });
        let executor = TcpTransaction::new(connection, Unit(1));

        // When
        let err = executor.execute(Request::ReadInputRegisters(0x1000, 1)).await.unwrap_err();

        // Then
        assert_eq!(
            err.exception().map(|rsp| rsp.exception),
            Some(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(executor.connection.lock().await.requests.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_transaction_id_is_retried_with_next_id() {
        // Given
        let mut answered = 0;
        let connection = MockConnection::new(move |request| {
            answered += 1;
            let mut response =
                request.create_response(Ok(Response::WriteSingleRegister(0x0001, 0x0003)));
            if answered == 1 {
                response.header.transaction_id = request.header.transaction_id.wrapping_add(100);
            }
            Some(Ok(response))
        });
        let executor = TcpTransaction::new(connection, Unit(1));

        // When
        let response = executor
            .execute(Request::WriteSingleRegister(0x0001, 0x0003))
            .await
            .unwrap();

        // Then
        assert_eq!(response, Response::WriteSingleRegister(0x0001, 0x0003));
        let connection = executor.connection.lock().await;
        let ids: Vec<_> = connection
            .requests
            .iter()
            .map(|request| request.header.transaction_id)
            .collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(connection.closes, 1);
        drop(connection);
        assert_eq!(executor.transaction_ids().current(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_carry_the_last_error() {
        let connection = MockConnection::new(|request| {
            let mut response = request.create_response(Ok(Response::ReadFifoQueue(vec![])));
            response.header.transaction_id ^= 0x0100;
            Some(Ok(response))
        });
        let config = TransactionConfig::default().retries(1);
        let executor =
            TcpTransaction::with_config(connection, Unit(1), config, TransactionIds::new());

        let err = executor.execute(Request::ReadFifoQueue(0)).await.unwrap_err();

        let Error::RetriesExhausted { attempts, last } = err else {
            unreachable!();
        };
        assert_eq!(attempts, 2);
        assert!(matches!(
            *last,
            Error::Validation(ValidationError::TransactionId { .. })
        ));
    }

    #[tokio::test]
    async fn reconnecting_closes_after_success() {
        let connection =
            MockConnection::new(|request| answer(request, Response::ReadExceptionStatus(0x6D)));
        let config = TransactionConfig::default().reconnecting(true);
        let executor =
            TcpTransaction::with_config(connection, Unit(1), config, TransactionIds::new());

        executor.execute(Request::ReadExceptionStatus).await.unwrap();
        executor.execute(Request::ReadExceptionStatus).await.unwrap();

        let connection = executor.connection.lock().await;
        assert_eq!(connection.connects, 2);
        assert_eq!(connection.closes, 2);
    }

    #[tokio::test]
    async fn headless_requests_carry_no_transaction_id() {
        let mut connection =
            MockConnection::new(|request| answer(request, Response::ReadExceptionStatus(0)));
        connection.headless = true;
        let executor = TcpTransaction::new(connection, Unit(7));

        executor.execute(Request::ReadExceptionStatus).await.unwrap();

        let connection = executor.connection.lock().await;
        assert_eq!(connection.requests[0].header, Header::headless(7));
    }

    #[tokio::test]
    async fn shared_transaction_ids_are_unique_across_executors() {
        let ids = TransactionIds::new();
        let first = TcpTransaction::with_config(
            MockConnection::new(|request| answer(request, Response::ReadExceptionStatus(0))),
            Unit(1),
            TransactionConfig::default(),
            ids.clone(),
        );
        let second = TcpTransaction::with_config(
            MockConnection::new(|request| answer(request, Response::ReadExceptionStatus(0))),
            Unit(1),
            TransactionConfig::default(),
            ids.clone(),
        );

        first.execute(Request::ReadExceptionStatus).await.unwrap();
        second.execute(Request::ReadExceptionStatus).await.unwrap();

        assert_eq!(second.connection.lock().await.requests[0].header.transaction_id, 1);
        assert_eq!(ids.current(), 2);
    }
}
