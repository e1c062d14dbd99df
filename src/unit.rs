// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

pub type UnitId = u8;

/// A single byte for addressing a (sub-)device behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unit(pub UnitId);

impl Unit {
    /// The special address for sending a broadcast message to all
    /// devices on a serial line at once. Broadcast requests are never
    /// answered.
    pub const fn broadcast() -> Self {
        Unit(0)
    }

    /// The minimum address of a single device.
    pub const fn min_device() -> Self {
        Unit(1)
    }

    /// The maximum address of a single device.
    pub const fn max_device() -> Self {
        Unit(247)
    }

    /// The address of a directly connected Modbus TCP device that is not
    /// behind a gateway.
    pub const fn tcp_device() -> Self {
        Unit(255)
    }

    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::broadcast()
    }

    #[must_use]
    pub fn is_single_device(self) -> bool {
        self >= Self::min_device() && self <= Self::max_device()
    }

    #[must_use]
    pub fn is_reserved(self) -> bool {
        self > Self::max_device()
    }
}

impl From<UnitId> for Unit {
    fn from(from: UnitId) -> Self {
        Unit(from)
    }
}

impl From<Unit> for UnitId {
    fn from(from: Unit) -> Self {
        from.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.0)
    }
}

/// Selects the unit that receives subsequent requests.
pub trait UnitContext {
    fn set_unit(&mut self, unit: Unit);
}
