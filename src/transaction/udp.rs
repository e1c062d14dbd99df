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

/// Executor for datagram terminals.
///
/// The terminal is activated once and kept across failed attempts.
#[derive(Debug)]
pub struct UdpTransaction<C> {
    terminal: Arc<Mutex<C>>,
    ids: TransactionIds,
    config: TransactionConfig,
    unit_id: UnitId,
}

impl<C> UdpTransaction<C>
where
    C: Connection,
{
    pub fn new(terminal: C, unit: Unit) -> Self {
        Self::with_config(terminal, unit, TransactionConfig::default(), TransactionIds::new())
    }

    pub fn with_config(
        terminal: C,
        unit: Unit,
        config: TransactionConfig,
        ids: TransactionIds,
    ) -> Self {
        Self {
            terminal: Arc::new(Mutex::new(terminal)),
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
        let mut terminal = self.terminal.lock().await;
        let header = Header::new(self.ids.current(), self.unit_id);
        let message = RequestMessage::new(header, request.clone());
        exchange(&mut *terminal, &message, &self.config, attempt).await
    }

    /// Sends the request and waits for the matching response.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        check_request(&request)?;
        {
            let mut terminal = self.terminal.lock().await;
            if !terminal.is_connected() {
                terminal.connect().await?;
            }
        }
        let attempts = self.config.attempts();
        let mut attempt = 1;
        enter(State::Idle, attempt);
        loop {
            let result = self.attempt(&request, attempt).await;
            if self.config.validity_check {
                self.ids.increment();
            }
            match result {
                Ok(response) => {
                    enter(State::Done, attempt);
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => {
                    enter(State::Failed, attempt);
                    return Err(err);
                }
                Err(err) => {
                    if attempt >= attempts {
                        enter(State::Failed, attempt);
                        return Err(exhausted(attempts, err));
                    }
                    enter(State::Retrying, attempt);
                    back_off(attempt, &err).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl<C> UnitContext for UdpTransaction<C> {
    fn set_unit(&mut self, unit: Unit) {
        self.unit_id = unit.into();
    }
}

#[async_trait]
impl<C> Client for UdpTransaction<C>
where
    C: Connection + 'static,
{
    async fn call(&mut self, request: Request) -> Result<Response> {
        self.execute(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.terminal.lock().await.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{frame::*, transaction::mock::MockConnection, Error};

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_asked_retries_plus_one_times() {
        // Given
        let executor = UdpTransaction::with_config(
            MockConnection::silent(),
            Unit(1),
            TransactionConfig::default().retries(2),
            TransactionIds::new(),
        );

        // When
        let err = executor.execute(Request::GetCommEventCounter).await.unwrap_err();

        // Then
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        let terminal = executor.terminal.lock().await;
        assert_eq!(terminal.requests.len(), 3);
        assert_eq!(terminal.connects, 1);
        assert_eq!(terminal.closes, 0);
        let ids: Vec<_> = terminal
            .requests
            .iter()
            .map(|request| request.header.transaction_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn activates_terminal_on_first_call() {
        let executor = UdpTransaction::new(
            MockConnection::new(|request| {
                Some(Ok(
                    request.create_response(Ok(Response::GetCommEventCounter(0xFFFF, 0x0108)))
                ))
            }),
            Unit(1),
        );

        let response = executor.execute(Request::GetCommEventCounter).await.unwrap();

        assert_eq!(response, Response::GetCommEventCounter(0xFFFF, 0x0108));
        assert!(executor.terminal.lock().await.is_connected());
    }
}
