// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process image: the data a slave reads and writes while answering requests.
//!
//! Every accessor is range checked. Addresses outside of a table are
//! rejected with [`ExceptionCode::IllegalDataAddress`], which is sent back
//! to the master as is.

mod execute;
mod simple;

pub use self::simple::{SimpleProcessImage, SubscriptionHandle};

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;

use crate::{
    bits::BitVector,
    frame::{
        Address, Coil, CommEventLog, ConformityLevel, ExceptionCode, ObjectId, Quantity, Word,
    },
};

/// Result of a process image access.
pub type AccessResult<T> = Result<T, ExceptionCode>;

/// Identification objects of a device, answered by "Read Device Identification".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentification {
    pub conformity_level: ConformityLevel,
    pub objects: BTreeMap<ObjectId, Bytes>,
}

impl DeviceIdentification {
    /// Basic identification: vendor name, product code and revision.
    #[must_use]
    pub fn basic(
        vendor_name: impl Into<Bytes>,
        product_code: impl Into<Bytes>,
        revision: impl Into<Bytes>,
    ) -> Self {
        let objects = [
            (0x00, vendor_name.into()),
            (0x01, product_code.into()),
            (0x02, revision.into()),
        ]
        .into_iter()
        .collect();
        Self {
            conformity_level: ConformityLevel::Basic,
            objects,
        }
    }

    /// Adds or replaces an object.
    #[must_use]
    pub fn with_object(mut self, id: ObjectId, value: impl Into<Bytes>) -> Self {
        self.objects.insert(id, value.into());
        self
    }

    /// Sets the announced conformity level.
    #[must_use]
    pub const fn conformity_level(mut self, conformity_level: ConformityLevel) -> Self {
        self.conformity_level = conformity_level;
        self
    }
}

/// The data tables of a slave.
///
/// Implementations perform their own synchronization, requests from
/// different connections may access the image concurrently.
pub trait ProcessImage: Send + Sync + fmt::Debug {
    fn read_coils(&self, address: Address, quantity: Quantity) -> AccessResult<BitVector>;

    fn write_coils(&self, address: Address, values: &[Coil]) -> AccessResult<()>;

    fn read_discrete_inputs(&self, address: Address, quantity: Quantity)
        -> AccessResult<BitVector>;

    fn read_input_registers(&self, address: Address, quantity: Quantity)
        -> AccessResult<Vec<Word>>;

    fn read_holding_registers(
        &self,
        address: Address,
        quantity: Quantity,
    ) -> AccessResult<Vec<Word>>;

    fn write_holding_registers(&self, address: Address, values: &[Word]) -> AccessResult<()>;

    /// Applies `(value & and_mask) | (or_mask & !and_mask)` to a holding register.
    ///
    /// The default implementation reads and writes the register in two
    /// separate steps.
    fn mask_write_holding_register(
        &self,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> AccessResult<()> {
        let current = self
            .read_holding_registers(address, 1)?
            .first()
            .copied()
            .ok_or(ExceptionCode::SlaveDeviceFailure)?;
        self.write_holding_registers(address, &[mask_write(current, and_mask, or_mask)])
    }

    /// Contents of the FIFO queue at `address`, oldest value first.
    fn read_fifo_queue(&self, address: Address) -> AccessResult<Vec<Word>>;

    fn read_file_record(
        &self,
        file_number: u16,
        record_number: u16,
        record_length: Quantity,
    ) -> AccessResult<Vec<Word>>;

    fn write_file_record(
        &self,
        file_number: u16,
        record_number: u16,
        values: &[Word],
    ) -> AccessResult<()>;

    /// Eight exception status outputs. Serial line only.
    fn exception_status(&self) -> AccessResult<u8> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Status word and event count. Serial line only.
    fn comm_event_counter(&self) -> AccessResult<(Word, Word)> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Serial line only.
    fn comm_event_log(&self) -> AccessResult<CommEventLog> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Slave ID, run indicator and additional data. Serial line only.
    fn slave_id(&self) -> AccessResult<(u8, bool, Vec<u8>)> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn device_identification(&self) -> AccessResult<DeviceIdentification> {
        Err(ExceptionCode::IllegalFunction)
    }
}

pub(crate) const fn mask_write(value: Word, and_mask: Word, or_mask: Word) -> Word {
    (value & and_mask) | (or_mask & !and_mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_write_example() {
        // Current 0x12, AND 0xF2, OR 0x25 yields 0x17
        assert_eq!(mask_write(0x12, 0xF2, 0x25), 0x17);
        assert_eq!(mask_write(0xABCD, 0xFFFF, 0x0000), 0xABCD);
        assert_eq!(mask_write(0xABCD, 0x0000, 0x1234), 0x1234);
    }

    #[test]
    fn basic_identification_objects() {
        let identification = DeviceIdentification::basic("slowtec", "ME-1", "0.1")
            .with_object(0x80, "private");
        assert_eq!(
            identification.objects.keys().copied().collect::<Vec<_>>(),
            vec![0x00, 0x01, 0x02, 0x80]
        );
        assert_eq!(identification.conformity_level, ConformityLevel::Basic);
    }
}
