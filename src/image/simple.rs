// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fmt,
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use crate::{
    bits::BitVector,
    consts::MAX_FIFO_COUNT,
    frame::{Address, Coil, CommEventLog, ExceptionCode, Quantity, Word},
};

use super::{mask_write, AccessResult, DeviceIdentification, ProcessImage};

/// Callback for changed holding registers: address and new value.
pub(crate) type RegisterListener = Arc<dyn Fn(Address, Word) + Send + Sync>;

/// Identifies a subscription for [`SimpleProcessImage::unsubscribe()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    range: Range<Address>,
    listener: RegisterListener,
}

/// Serial line diagnostics, unsupported until they are set.
#[derive(Debug, Default)]
struct SerialStatus {
    exception_status: Option<u8>,
    comm_event_log: Option<CommEventLog>,
    slave_id: Option<(u8, bool, Vec<u8>)>,
    device_identification: Option<DeviceIdentification>,
}

/// In-memory process image with fixed size tables.
///
/// Every table has its own lock. Listeners for holding register changes are
/// invoked after all locks have been released, so they may access the image.
#[derive(Default)]
pub struct SimpleProcessImage {
    coils: RwLock<Vec<Coil>>,
    discrete_inputs: RwLock<Vec<Coil>>,
    input_registers: RwLock<Vec<Word>>,
    holding_registers: RwLock<Vec<Word>>,
    fifos: RwLock<HashMap<Address, VecDeque<Word>>>,
    files: RwLock<BTreeMap<u16, BTreeMap<u16, Vec<Word>>>>,
    status: RwLock<SerialStatus>,
    subscriptions: Mutex<HashMap<SubscriptionHandle, Subscription>>,
    next_subscription: AtomicU64,
}

impl fmt::Debug for SimpleProcessImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleProcessImage")
            .field("coils", &self.coils)
            .field("discrete_inputs", &self.discrete_inputs)
            .field("input_registers", &self.input_registers)
            .field("holding_registers", &self.holding_registers)
            .field("fifos", &self.fifos)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> AccessResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| {
        log::error!("Process image lock poisoned");
        ExceptionCode::SlaveDeviceFailure
    })
}

fn write<T>(lock: &RwLock<T>) -> AccessResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| {
        log::error!("Process image lock poisoned");
        ExceptionCode::SlaveDeviceFailure
    })
}

/// Index range of `quantity` items at `address` within a table of `len` items.
fn checked_range(address: Address, quantity: usize, len: usize) -> AccessResult<Range<usize>> {
    let start = usize::from(address);
    let end = start + quantity;
    if end > len {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start..end)
}

fn read_bits(table: &[Coil], address: Address, quantity: Quantity) -> AccessResult<BitVector> {
    let range = checked_range(address, quantity.into(), table.len())?;
    Ok(BitVector::from(&table[range]))
}

impl SimpleProcessImage {
    /// An image without any data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An image with the given number of zeroed items per table.
    #[must_use]
    pub fn with_sizes(
        coils: usize,
        discrete_inputs: usize,
        input_registers: usize,
        holding_registers: usize,
    ) -> Self {
        Self {
            coils: RwLock::new(vec![false; coils]),
            discrete_inputs: RwLock::new(vec![false; discrete_inputs]),
            input_registers: RwLock::new(vec![0; input_registers]),
            holding_registers: RwLock::new(vec![0; holding_registers]),
            ..Default::default()
        }
    }

    pub fn set_coils(&self, address: Address, values: &[Coil]) -> AccessResult<()> {
        self.write_coils(address, values)
    }

    pub fn set_discrete_inputs(&self, address: Address, values: &[Coil]) -> AccessResult<()> {
        let mut table = write(&self.discrete_inputs)?;
        let range = checked_range(address, values.len(), table.len())?;
        table[range].copy_from_slice(values);
        Ok(())
    }

    pub fn set_input_registers(&self, address: Address, values: &[Word]) -> AccessResult<()> {
        let mut table = write(&self.input_registers)?;
        let range = checked_range(address, values.len(), table.len())?;
        table[range].copy_from_slice(values);
        Ok(())
    }

    pub fn set_holding_registers(&self, address: Address, values: &[Word]) -> AccessResult<()> {
        self.write_holding_registers(address, values)
    }

    /// Replaces the FIFO queue at `address`.
    pub fn set_fifo_queue(&self, address: Address, values: impl IntoIterator<Item = Word>) {
        if let Ok(mut fifos) = write(&self.fifos) {
            fifos.insert(address, values.into_iter().collect());
        }
    }

    /// Appends a value to the FIFO queue at `address`.
    ///
    /// The oldest value is dropped once the queue holds more values than
    /// a single response can carry.
    pub fn push_fifo_queue(&self, address: Address, value: Word) {
        if let Ok(mut fifos) = write(&self.fifos) {
            let queue = fifos.entry(address).or_default();
            queue.push_back(value);
            if queue.len() > MAX_FIFO_COUNT {
                queue.pop_front();
            }
        }
    }

    /// Replaces a record of a file, creating the file if needed.
    pub fn set_file_record(&self, file_number: u16, record_number: u16, values: Vec<Word>) {
        if let Ok(mut files) = write(&self.files) {
            files
                .entry(file_number)
                .or_default()
                .insert(record_number, values);
        }
    }

    pub fn set_exception_status(&self, status: u8) {
        if let Ok(mut serial) = write(&self.status) {
            serial.exception_status = Some(status);
        }
    }

    pub fn set_comm_event_log(&self, log: CommEventLog) {
        if let Ok(mut serial) = write(&self.status) {
            serial.comm_event_log = Some(log);
        }
    }

    pub fn set_slave_id(&self, slave_id: u8, run_indicator: bool, data: Vec<u8>) {
        if let Ok(mut serial) = write(&self.status) {
            serial.slave_id = Some((slave_id, run_indicator, data));
        }
    }

    pub fn set_device_identification(&self, identification: DeviceIdentification) {
        if let Ok(mut serial) = write(&self.status) {
            serial.device_identification = Some(identification);
        }
    }

    /// Registers `listener` for changes of holding registers within `range`.
    pub fn subscribe(
        &self,
        range: Range<Address>,
        listener: impl Fn(Address, Word) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            range,
            listener: Arc::new(listener),
        };
        match self.subscriptions.lock() {
            Ok(mut subscriptions) => {
                subscriptions.insert(handle, subscription);
            }
            Err(_) => log::error!("Subscription table poisoned"),
        }
        handle
    }

    /// Removes a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscriptions
            .lock()
            .map(|mut subscriptions| subscriptions.remove(&handle).is_some())
            .unwrap_or(false)
    }

    fn notify(&self, changes: &[(Address, Word)]) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<(Range<Address>, RegisterListener)> = match self.subscriptions.lock() {
            Ok(subscriptions) => subscriptions
                .values()
                .map(|subscription| {
                    (
                        subscription.range.clone(),
                        Arc::clone(&subscription.listener),
                    )
                })
                .collect(),
            Err(_) => return,
        };
        for (address, value) in changes {
            for (range, listener) in &listeners {
                if range.contains(address) {
                    listener(*address, *value);
                }
            }
        }
    }

    fn update_holding_registers(
        &self,
        address: Address,
        update: impl FnOnce(&mut [Word]),
        quantity: usize,
    ) -> AccessResult<()> {
        let changes = {
            let mut table = write(&self.holding_registers)?;
            let range = checked_range(address, quantity, table.len())?;
            let start = range.start;
            let slice = &mut table[range];
            let before = slice.to_vec();
            update(slice);
            before
                .into_iter()
                .zip(slice.iter().copied())
                .zip(start..)
                .filter(|((old, new), _)| old != new)
                .filter_map(|((_, new), index)| Address::try_from(index).ok().map(|address| (address, new)))
                .collect::<Vec<_>>()
        };
        self.notify(&changes);
        Ok(())
    }
}

impl ProcessImage for SimpleProcessImage {
    fn read_coils(&self, address: Address, quantity: Quantity) -> AccessResult<BitVector> {
        read_bits(&read(&self.coils)?, address, quantity)
    }

    fn write_coils(&self, address: Address, values: &[Coil]) -> AccessResult<()> {
        let mut table = write(&self.coils)?;
        let range = checked_range(address, values.len(), table.len())?;
        table[range].copy_from_slice(values);
        Ok(())
    }

    fn read_discrete_inputs(
        &self,
        address: Address,
        quantity: Quantity,
    ) -> AccessResult<BitVector> {
        read_bits(&read(&self.discrete_inputs)?, address, quantity)
    }

    fn read_input_registers(
        &self,
        address: Address,
        quantity: Quantity,
    ) -> AccessResult<Vec<Word>> {
        let table = read(&self.input_registers)?;
        let range = checked_range(address, quantity.into(), table.len())?;
        Ok(table[range].to_vec())
    }

    fn read_holding_registers(
        &self,
        address: Address,
        quantity: Quantity,
    ) -> AccessResult<Vec<Word>> {
        let table = read(&self.holding_registers)?;
        let range = checked_range(address, quantity.into(), table.len())?;
        Ok(table[range].to_vec())
    }

    fn write_holding_registers(&self, address: Address, values: &[Word]) -> AccessResult<()> {
        self.update_holding_registers(
            address,
            |registers| registers.copy_from_slice(values),
            values.len(),
        )
    }

    fn mask_write_holding_register(
        &self,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> AccessResult<()> {
        self.update_holding_registers(
            address,
            |registers| {
                for value in registers {
                    *value = mask_write(*value, and_mask, or_mask);
                }
            },
            1,
        )
    }

    fn read_fifo_queue(&self, address: Address) -> AccessResult<Vec<Word>> {
        let fifos = read(&self.fifos)?;
        let queue = fifos
            .get(&address)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        if queue.len() > MAX_FIFO_COUNT {
            return Err(ExceptionCode::IllegalDataValue);
        }
        Ok(queue.iter().copied().collect())
    }

    fn read_file_record(
        &self,
        file_number: u16,
        record_number: u16,
        record_length: Quantity,
    ) -> AccessResult<Vec<Word>> {
        let files = read(&self.files)?;
        let record = files
            .get(&file_number)
            .and_then(|file| file.get(&record_number))
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        record
            .get(..usize::from(record_length))
            .map(<[Word]>::to_vec)
            .ok_or(ExceptionCode::IllegalDataAddress)
    }

    fn write_file_record(
        &self,
        file_number: u16,
        record_number: u16,
        values: &[Word],
    ) -> AccessResult<()> {
        let mut files = write(&self.files)?;
        let record = files
            .get_mut(&file_number)
            .and_then(|file| file.get_mut(&record_number))
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        record
            .get_mut(..values.len())
            .ok_or(ExceptionCode::IllegalDataAddress)?
            .copy_from_slice(values);
        Ok(())
    }

    fn exception_status(&self) -> AccessResult<u8> {
        read(&self.status)?
            .exception_status
            .ok_or(ExceptionCode::IllegalFunction)
    }

    fn comm_event_counter(&self) -> AccessResult<(Word, Word)> {
        read(&self.status)?
            .comm_event_log
            .as_ref()
            .map(|log| (log.status, log.event_count))
            .ok_or(ExceptionCode::IllegalFunction)
    }

    fn comm_event_log(&self) -> AccessResult<CommEventLog> {
        read(&self.status)?
            .comm_event_log
            .clone()
            .ok_or(ExceptionCode::IllegalFunction)
    }

    fn slave_id(&self) -> AccessResult<(u8, bool, Vec<u8>)> {
        read(&self.status)?
            .slave_id
            .clone()
            .ok_or(ExceptionCode::IllegalFunction)
    }

    fn device_identification(&self) -> AccessResult<DeviceIdentification> {
        read(&self.status)?
            .device_identification
            .clone()
            .ok_or(ExceptionCode::IllegalFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn read_within_bounds() {
        // Given
        let image = SimpleProcessImage::with_sizes(0, 0, 4, 0);
        image.set_input_registers(1, &[0x1234, 0x5678]).unwrap();

        // When
        let values = image.read_input_registers(0, 4).unwrap();

        // Then
        assert_eq!(values, vec![0, 0x1234, 0x5678, 0]);
    }

    #[test]
    fn access_beyond_table_is_an_illegal_address() {
        let image = SimpleProcessImage::with_sizes(10, 10, 10, 10);
        assert_eq!(
            image.read_coils(5, 6).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            image.write_holding_registers(9, &[1, 2]).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            image.read_discrete_inputs(0xFFFF, 1).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert!(image.read_coils(0, 10).is_ok());
    }

    #[test]
    fn coils_are_packed() {
        let image = SimpleProcessImage::with_sizes(10, 0, 0, 0);
        image.set_coils(0, &[true, false, true]).unwrap();

        let bits = image.read_coils(0, 3).unwrap();

        assert_eq!(bits.size(), 3);
        assert_eq!(bits.as_bytes(), &[0b101]);
    }

    #[test]
    fn listeners_see_changed_registers_only() {
        // Given
        let image = SimpleProcessImage::with_sizes(0, 0, 0, 8);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&changes);
        let handle = image.subscribe(2..4, move |address, value| {
            recorded.lock().unwrap().push((address, value));
        });

        // When
        image.write_holding_registers(1, &[7, 0, 9, 5]).unwrap();

        // Then
        assert_eq!(*changes.lock().unwrap(), vec![(3, 9)]);
        assert!(image.unsubscribe(handle));
        assert!(!image.unsubscribe(handle));
    }

    #[test]
    fn unsubscribed_listener_is_not_invoked() {
        let image = SimpleProcessImage::with_sizes(0, 0, 0, 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = image.subscribe(0..1, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        image.write_holding_registers(0, &[1]).unwrap();
        image.unsubscribe(handle);
        image.write_holding_registers(0, &[2]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_read_the_image() {
        let image = Arc::new(SimpleProcessImage::with_sizes(0, 0, 0, 2));
        let seen = Arc::new(Mutex::new(None));
        let (reader, sink) = (Arc::clone(&image), Arc::clone(&seen));
        image.subscribe(0..2, move |address, _| {
            *sink.lock().unwrap() = reader.read_holding_registers(address, 1).ok();
        });

        image.mask_write_holding_register(1, 0x00F0, 0x0F0F).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(vec![0x0F0F]));
    }

    #[test]
    fn write_up_to_the_last_address() {
        // Given
        let image = SimpleProcessImage::with_sizes(0, 0, 0, 0x1_0000);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&changes);
        image.subscribe(0xFFF0..0xFFFF, move |address, value| {
            recorded.lock().unwrap().push((address, value));
        });

        // When
        image.write_holding_registers(0xFFFE, &[1, 2]).unwrap();
        image.write_holding_registers(0xFFFF, &[3]).unwrap();
        image
            .mask_write_holding_register(0xFFFF, 0x00FF, 0x0100)
            .unwrap();

        // Then
        assert_eq!(
            image.read_holding_registers(0xFFFE, 2).unwrap(),
            vec![1, 0x0103]
        );
        assert_eq!(*changes.lock().unwrap(), vec![(0xFFFE, 1)]);
        assert_eq!(
            image.write_holding_registers(0xFFFF, &[1, 2]).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn fifo_queue_keeps_the_latest_values() {
        let image = SimpleProcessImage::new();
        for value in 0..40 {
            image.push_fifo_queue(0x04DE, value);
        }

        let values = image.read_fifo_queue(0x04DE).unwrap();

        assert_eq!(values.len(), MAX_FIFO_COUNT);
        assert_eq!(values.first(), Some(&9));
        assert_eq!(
            image.read_fifo_queue(0).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn oversized_fifo_queue_is_an_illegal_value() {
        let image = SimpleProcessImage::new();
        image.set_fifo_queue(1, 0..32);
        assert_eq!(
            image.read_fifo_queue(1).unwrap_err(),
            ExceptionCode::IllegalDataValue
        );
    }

    #[test]
    fn file_records() {
        // Given
        let image = SimpleProcessImage::new();
        image.set_file_record(4, 1, vec![0x0DFE, 0x0020, 0x0000]);

        // When
        image.write_file_record(4, 1, &[0x06AF]).unwrap();

        // Then
        assert_eq!(image.read_file_record(4, 1, 2).unwrap(), vec![0x06AF, 0x0020]);
        assert_eq!(
            image.read_file_record(4, 1, 4).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(
            image.read_file_record(3, 1, 1).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn serial_status_is_unsupported_until_set() {
        let image = SimpleProcessImage::new();
        assert_eq!(
            image.exception_status().unwrap_err(),
            ExceptionCode::IllegalFunction
        );

        image.set_exception_status(0x6D);
        image.set_comm_event_log(CommEventLog {
            status: 0xFFFF,
            event_count: 0x0108,
            ..Default::default()
        });

        assert_eq!(image.exception_status().unwrap(), 0x6D);
        assert_eq!(image.comm_event_counter().unwrap(), (0xFFFF, 0x0108));
    }
}
