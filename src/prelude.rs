// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Modules
///////////////////////////////////////////////////////////////////
pub use crate::client;

#[allow(missing_docs)]
pub mod tcp {
    pub use crate::client::tcp::*;
}

#[allow(missing_docs)]
pub mod rtu {
    pub use crate::client::rtu::*;
}

#[allow(missing_docs)]
pub mod ascii {
    pub use crate::client::ascii::*;
}

#[allow(missing_docs)]
pub mod udp {
    pub use crate::client::udp::*;
}

#[allow(missing_docs)]
#[cfg(feature = "sync")]
pub mod sync {
    pub use crate::client::sync::*;
}

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{ExceptionCode, Request, Response};
pub use crate::{Unit, UnitId};

pub use crate::image::{ProcessImage, SimpleProcessImage};
pub use crate::server::{ProcessorConfig, RequestProcessor, SlaveRequest};

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::client::{Client, Reader, Writer};
pub use crate::server::Service;
pub use crate::UnitContext;

#[cfg(feature = "sync")]
pub use crate::client::sync::{Client as SyncClient, Reader as SyncReader, Writer as SyncWriter};
