// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol constants and defaults.

use std::time::Duration;

/// Maximum size of a single message on any medium, including header and checksum.
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// Maximum number of bits that may be read with a single request.
pub const MAX_BITS: u16 = 2000;

/// Maximum number of registers that may be read with a single request.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers that may be written with a single request.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of registers that may be written by a read/write request.
pub const MAX_READ_WRITE_REGISTERS: u16 = 121;

/// Maximum number of values a FIFO queue may return.
pub const MAX_FIFO_COUNT: usize = 31;

/// Default timeout for reading a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Base of the jittered backoff between two attempts.
pub const RETRY_SLEEP_TIME: Duration = Duration::from_millis(500);

/// Number of retries after the initial attempt.
pub const DEFAULT_RETRIES: u32 = 5;

/// Largest transaction identifier before the counter wraps to `0`.
pub const MAX_TRANSACTION_ID: u16 = 32767;

/// Silent interval between two serial frames, in character times.
pub const INTER_MESSAGE_GAP: f64 = 3.5;

/// Lower bound of the silent interval between two serial frames.
pub const MINIMUM_TRANSMIT_DELAY: Duration = Duration::from_millis(2);

/// Well-known Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;

/// Protocol identifier of Modbus in the MBAP header.
pub const PROTOCOL_ID: u16 = 0x0000;

/// Unit identifier used when nothing else has been selected.
pub const DEFAULT_UNIT_ID: u8 = 0;
