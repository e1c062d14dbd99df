// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response exchanges with retries, backoff and validation.
//!
//! Every executor runs the same per-call state machine:
//! `Idle → Sending → AwaitingResponse → (Validating | Retrying) → Done | Failed`.
//! A call makes at most `retries + 1` attempts. Exception responses are
//! answers of the peer and end the call immediately.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    codec::{request_pdu_len, MAX_PDU_SIZE},
    consts::{DEFAULT_RETRIES, MAX_TRANSACTION_ID, RETRY_SLEEP_TIME},
    frame::{Request, RequestMessage, Response, ResponseMessage, TransactionId},
    transport::Transport,
    Error, FramingError, Result, ValidationError,
};

pub mod serial;
pub mod tcp;
pub mod udp;

pub use self::{serial::SerialTransaction, tcp::TcpTransaction, udp::UdpTransaction};

/// Behavior of a transaction executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Number of repetitions after a failed first attempt.
    pub retries: u32,

    /// Responses must carry the transaction id of the request.
    ///
    /// The id is only advanced while this check is enabled.
    pub validity_check: bool,

    /// Close the connection after every successful exchange.
    pub reconnecting: bool,
}

impl TransactionConfig {
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn validity_check(mut self, validity_check: bool) -> Self {
        self.validity_check = validity_check;
        self
    }

    #[must_use]
    pub const fn reconnecting(mut self, reconnecting: bool) -> Self {
        self.reconnecting = reconnecting;
        self
    }

    pub(crate) const fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            validity_check: true,
            reconnecting: false,
        }
    }
}

/// Allocator of transaction identifiers in `[0, MAX_TRANSACTION_ID]`.
///
/// Clones share the same counter, e.g. for unique identifiers across
/// multiple executors.
#[derive(Debug, Clone, Default)]
pub struct TransactionIds(Arc<AtomicU16>);

impl TransactionIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starting_at(id: TransactionId) -> Self {
        Self(Arc::new(AtomicU16::new(id.min(MAX_TRANSACTION_ID))))
    }

    /// The identifier of the next request.
    #[must_use]
    pub fn current(&self) -> TransactionId {
        self.0.load(Ordering::Acquire)
    }

    /// Advances the counter, wrapping to `0` after [`MAX_TRANSACTION_ID`].
    ///
    /// Returns the new value.
    pub fn increment(&self) -> TransactionId {
        let previous = match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| Some(next_id(id)))
        {
            Ok(id) | Err(id) => id,
        };
        next_id(previous)
    }
}

const fn next_id(id: TransactionId) -> TransactionId {
    if id >= MAX_TRANSACTION_ID {
        0
    } else {
        id + 1
    }
}

/// Step of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Sending,
    AwaitingResponse,
    Validating,
    Retrying,
    Done,
    Failed,
}

pub(crate) fn enter(state: State, attempt: u32) {
    log::trace!("Attempt {attempt}: {state:?}");
}

/// Jittered pause before repeating attempt number `attempt` (starting at 1).
///
/// Half of [`RETRY_SLEEP_TIME`] plus a random share that grows with
/// every attempt.
#[must_use]
pub fn random_sleep_time(attempt: u32) -> Duration {
    let base = RETRY_SLEEP_TIME.as_secs_f64();
    Duration::from_secs_f64(base / 2.0 + rand::random::<f64>() * base * f64::from(attempt))
}

pub(crate) async fn back_off(attempt: u32, err: &Error) {
    let pause = random_sleep_time(attempt);
    log::debug!("Attempt {attempt} failed: {err}, retrying in {pause:?}");
    tokio::time::sleep(pause).await;
}

pub(crate) fn exhausted(attempts: u32, last: Error) -> Error {
    log::warn!("Giving up after {attempts} attempt(s): {last}");
    Error::RetriesExhausted {
        attempts,
        last: Box::new(last),
    }
}

/// Requests that can't be encoded would fail in every attempt.
pub(crate) fn check_request(request: &Request) -> Result<()> {
    let len = request_pdu_len(request);
    if len > MAX_PDU_SIZE {
        return Err(FramingError::MessageTooLong(len).into());
    }
    Ok(())
}

/// Turns the response into the result of the call.
pub(crate) fn validate(
    request: &RequestMessage,
    response: ResponseMessage,
    config: &TransactionConfig,
) -> Result<Response> {
    let mut response_body = match response.body.0 {
        Ok(body) => body,
        Err(exception) => return Err(Error::Exception(exception)),
    };
    if config.validity_check
        && !request.header.headless
        && response.header.transaction_id != request.header.transaction_id
    {
        return Err(ValidationError::TransactionId {
            expected: request.header.transaction_id,
            actual: response.header.transaction_id,
        }
        .into());
    }
    if response_body.function_code() != request.function_code() {
        return Err(ValidationError::FunctionCode {
            expected: request.function_code(),
            actual: response_body.function_code(),
        }
        .into());
    }
    response_body.fit_to(&request.body);
    Ok(response_body)
}

/// Writes the request and validates the response.
pub(crate) async fn exchange<T>(
    transport: &mut T,
    request: &RequestMessage,
    config: &TransactionConfig,
    attempt: u32,
) -> Result<Response>
where
    T: Transport + ?Sized,
{
    enter(State::Sending, attempt);
    transport.write_request(request).await?;
    enter(State::AwaitingResponse, attempt);
    let response = transport.read_response().await?;
    enter(State::Validating, attempt);
    validate(request, response, config)
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{fmt, io};

    use async_trait::async_trait;

    use crate::{
        error::timed_out,
        frame::{RequestMessage, ResponseMessage},
        transport::{Connection, Transport},
        Result,
    };

    type Responder = Box<dyn FnMut(&RequestMessage) -> Option<Result<ResponseMessage>> + Send>;

    /// Answers requests from a closure, `None` simulates a silent peer.
    pub(crate) struct MockConnection {
        pub(crate) headless: bool,
        pub(crate) connected: bool,
        pub(crate) connects: usize,
        pub(crate) closes: usize,
        pub(crate) requests: Vec<RequestMessage>,
        pending: Option<Result<ResponseMessage>>,
        responder: Responder,
    }

    impl MockConnection {
        pub(crate) fn new(
            responder: impl FnMut(&RequestMessage) -> Option<Result<ResponseMessage>> + Send + 'static,
        ) -> Self {
            Self {
                headless: false,
                connected: false,
                connects: 0,
                closes: 0,
                requests: Vec::new(),
                pending: None,
                responder: Box::new(responder),
            }
        }

        pub(crate) fn silent() -> Self {
            Self::new(|_| None)
        }
    }

    impl fmt::Debug for MockConnection {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MockConnection")
                .field("connected", &self.connected)
                .field("requests", &self.requests.len())
                .finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl Transport for MockConnection {
        fn is_headless(&self) -> bool {
            self.headless
        }

        async fn write_request(&mut self, request: &RequestMessage) -> Result<()> {
            self.requests.push(request.clone());
            self.pending = (self.responder)(request);
            Ok(())
        }

        async fn read_response(&mut self) -> Result<ResponseMessage> {
            self.pending.take().unwrap_or_else(|| Err(timed_out()))
        }

        async fn close(&mut self) -> io::Result<()> {
            self.connected = false;
            self.closes += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> Result<()> {
            self.connected = true;
            self.connects += 1;
            Ok(())
        }
    }
}
