// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::Mutex,
};

use crate::{
    client::Client,
    codec::serial::ClientCodec,
    frame::{Header, Request, RequestMessage, Response},
    transport::SerialTransport,
    unit::{Unit, UnitContext, UnitId},
    Result,
};

use super::{
    back_off, check_request, enter, exchange, exhausted, State, TransactionConfig, TransactionIds,
};

/// Executor for serial lines.
///
/// The line is never reopened. Before every frame the inter-frame delay
/// is awaited.
#[derive(Debug)]
pub struct SerialTransaction<T> {
    transport: Arc<Mutex<SerialTransport<T, ClientCodec>>>,
    ids: TransactionIds,
    config: TransactionConfig,
    unit_id: UnitId,
}

impl<T> SerialTransaction<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug,
{
    pub fn new(transport: SerialTransport<T, ClientCodec>, unit: Unit) -> Self {
        Self::with_config(transport, unit, TransactionConfig::default(), TransactionIds::new())
    }

    pub fn with_config(
        transport: SerialTransport<T, ClientCodec>,
        unit: Unit,
        config: TransactionConfig,
        ids: TransactionIds,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
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
        let mut transport = self.transport.lock().await;
        transport.wait_between_frames().await;
        let mut header = Header::headless(self.unit_id);
        // Never transmitted, but keeps the exchanges distinguishable in logs
        header.transaction_id = self.ids.current();
        let message = RequestMessage::new(header, request.clone());
        let result = exchange(&mut *transport, &message, &self.config, attempt).await;
        transport.stamp();
        result
    }

    /// Sends the request and waits for the matching response.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        check_request(&request)?;
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

impl<T> UnitContext for SerialTransaction<T> {
    fn set_unit(&mut self, unit: Unit) {
        self.unit_id = unit.into();
    }
}

#[async_trait]
impl<T> Client for SerialTransaction<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug + 'static,
{
    async fn call(&mut self, request: Request) -> Result<Response> {
        self.execute(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.transport.lock().await.shutdown().await
    }
}
