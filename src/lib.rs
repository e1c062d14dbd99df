// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) protocol engine
//! based on [tokio](https://tokio.rs).
//!
//! The crate covers the complete exchange between a master and its slaves:
//!
//! - encoding and decoding of requests, responses and exception responses
//!   ([`codec`]),
//! - framing for TCP (MBAP or headless RTU over TCP), serial lines in RTU or
//!   ASCII encoding, and UDP ([`transport`]),
//! - transactions with retries, jittered backoff and response validation
//!   ([`transaction`]),
//! - a master facade ([`client`]) and the slave side ([`server`]) that answers
//!   requests from a [`image::ProcessImage`].
//!
//! To avoid confusion with the tokio terminology the master is called *client*
//! and the slave is called *server* in this library.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! modbus-engine = "*"
//! ```
//!
//! Opening native serial ports requires the `serial-port` feature, the blocking
//! client is available with the `sync` feature.

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
// Additional restrictions
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::self_named_module_files)]
// Exceptions
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod bits;
pub mod checksum;
pub mod client;
pub mod codec;
pub mod consts;
pub mod image;
pub mod prelude;
pub mod server;
pub mod transaction;
pub mod transport;

mod error;
pub use self::error::{Error, FramingError, ValidationError};

mod frame;
pub use self::frame::*;

mod unit;
pub use self::unit::{Unit, UnitContext, UnitId};

pub use self::bits::BitVector;

/// Specialized [`std::result::Result`] type for the protocol engine.
pub type Result<T> = std::result::Result<T, Error>;
