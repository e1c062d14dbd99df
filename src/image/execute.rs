// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::ops::RangeInclusive;

use crate::{
    codec::{response_pdu_len, MAX_PDU_SIZE},
    consts::{
        MAX_BITS, MAX_FIFO_COUNT, MAX_READ_REGISTERS, MAX_READ_WRITE_REGISTERS,
        MAX_WRITE_REGISTERS,
    },
    frame::{
        DeviceIdObject, ExceptionCode, FileRecord, ObjectId, Quantity, ReadCode,
        ReadDeviceIdentificationResponse, Request, Response,
    },
};

use super::{DeviceIdentification, ProcessImage};

/// Diagnostics sub-function "Return Query Data".
const RETURN_QUERY_DATA: u16 = 0x0000;

/// Highest record number within a file.
const MAX_RECORD_NUMBER: u16 = 0x270F;

/// Function code, MEI type, read code, conformity level, more follows,
/// next object id and number of objects.
const DEVICE_ID_HEADER_LEN: usize = 7;

fn check_quantity(quantity: usize, max: u16) -> Result<(), ExceptionCode> {
    if quantity == 0 || quantity > usize::from(max) {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn quantity(len: usize) -> Quantity {
    // Bounded by the quantity checks
    len as Quantity
}

fn check_response_len(response: Response) -> Result<Response, ExceptionCode> {
    if response_pdu_len(&response) > MAX_PDU_SIZE {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(response)
}

impl Request {
    /// Builds the response to this request from `image`.
    ///
    /// Quantities outside of their legal range are rejected with
    /// [`ExceptionCode::IllegalDataValue`] before the image is accessed.
    pub fn execute<I>(&self, image: &I) -> Result<Response, ExceptionCode>
    where
        I: ProcessImage + ?Sized,
    {
        use Request::*;

        match self {
            ReadCoils(address, count) => {
                check_quantity((*count).into(), MAX_BITS)?;
                image.read_coils(*address, *count).map(Response::ReadCoils)
            }
            ReadDiscreteInputs(address, count) => {
                check_quantity((*count).into(), MAX_BITS)?;
                image
                    .read_discrete_inputs(*address, *count)
                    .map(Response::ReadDiscreteInputs)
            }
            ReadHoldingRegisters(address, count) => {
                check_quantity((*count).into(), MAX_READ_REGISTERS)?;
                image
                    .read_holding_registers(*address, *count)
                    .map(Response::ReadHoldingRegisters)
            }
            ReadInputRegisters(address, count) => {
                check_quantity((*count).into(), MAX_READ_REGISTERS)?;
                image
                    .read_input_registers(*address, *count)
                    .map(Response::ReadInputRegisters)
            }
            WriteSingleCoil(address, coil) => {
                image.write_coils(*address, &[*coil])?;
                Ok(Response::WriteSingleCoil(*address, *coil))
            }
            WriteSingleRegister(address, value) => {
                image.write_holding_registers(*address, &[*value])?;
                Ok(Response::WriteSingleRegister(*address, *value))
            }
            WriteMultipleCoils(address, coils) => {
                check_quantity(coils.size(), MAX_BITS)?;
                image.write_coils(*address, &coils.to_vec())?;
                Ok(Response::WriteMultipleCoils(
                    *address,
                    quantity(coils.size()),
                ))
            }
            WriteMultipleRegisters(address, values) => {
                check_quantity(values.len(), MAX_WRITE_REGISTERS)?;
                image.write_holding_registers(*address, values)?;
                Ok(Response::WriteMultipleRegisters(
                    *address,
                    quantity(values.len()),
                ))
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                image.mask_write_holding_register(*address, *and_mask, *or_mask)?;
                Ok(Response::MaskWriteRegister(*address, *and_mask, *or_mask))
            }
            ReadWriteMultipleRegisters(read_address, read_count, write_address, values) => {
                check_quantity((*read_count).into(), MAX_READ_REGISTERS)?;
                check_quantity(values.len(), MAX_READ_WRITE_REGISTERS)?;
                image.write_holding_registers(*write_address, values)?;
                image
                    .read_holding_registers(*read_address, *read_count)
                    .map(Response::ReadWriteMultipleRegisters)
            }
            ReadFifoQueue(address) => {
                let values = image.read_fifo_queue(*address)?;
                if values.len() > MAX_FIFO_COUNT {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Response::ReadFifoQueue(values))
            }
            ReadFileRecord(requests) => {
                if requests.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let records = requests
                    .iter()
                    .map(|request| {
                        if request.record_number > MAX_RECORD_NUMBER {
                            return Err(ExceptionCode::IllegalDataAddress);
                        }
                        image.read_file_record(
                            request.file_number,
                            request.record_number,
                            request.record_length,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                check_response_len(Response::ReadFileRecord(records))
            }
            WriteFileRecord(records) => {
                if records.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                for FileRecord {
                    file_number,
                    record_number,
                    values,
                } in records
                {
                    if *record_number > MAX_RECORD_NUMBER {
                        return Err(ExceptionCode::IllegalDataAddress);
                    }
                    image.write_file_record(*file_number, *record_number, values)?;
                }
                Ok(Response::WriteFileRecord(records.clone()))
            }
            ReadExceptionStatus => image.exception_status().map(Response::ReadExceptionStatus),
            Diagnostics(sub_function, data) => match *sub_function {
                RETURN_QUERY_DATA => Ok(Response::Diagnostics(*sub_function, *data)),
                _ => Err(ExceptionCode::IllegalFunction),
            },
            GetCommEventCounter => image
                .comm_event_counter()
                .map(|(status, count)| Response::GetCommEventCounter(status, count)),
            GetCommEventLog => image
                .comm_event_log()
                .map(Response::GetCommEventLog)
                .and_then(check_response_len),
            ReportSlaveId => image
                .slave_id()
                .map(|(id, running, data)| Response::ReportSlaveId(id, running, data))
                .and_then(check_response_len),
            ReadDeviceIdentification(read_code, object_id) => {
                let identification = image.device_identification()?;
                read_device_identification(&identification, *read_code, *object_id)
                    .map(Response::ReadDeviceIdentification)
            }
            IllegalFunction(_, _) => Err(ExceptionCode::IllegalFunction),
        }
    }
}

/// Objects that a stream access with `read_code` may return.
const fn stream_objects(read_code: ReadCode) -> RangeInclusive<ObjectId> {
    match read_code {
        ReadCode::Basic => 0x00..=0x02,
        ReadCode::Regular => 0x00..=0x7F,
        ReadCode::Extended | ReadCode::Specific => 0x00..=0xFF,
    }
}

fn read_device_identification(
    identification: &DeviceIdentification,
    read_code: ReadCode,
    object_id: ObjectId,
) -> Result<ReadDeviceIdentificationResponse, ExceptionCode> {
    let conformity_level = identification.conformity_level;
    if read_code == ReadCode::Specific {
        let value = identification
            .objects
            .get(&object_id)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        return Ok(ReadDeviceIdentificationResponse {
            read_code,
            conformity_level,
            more_follows: false,
            next_object_id: 0,
            device_id_objects: vec![DeviceIdObject::new(object_id, value.clone())],
        });
    }

    let category = stream_objects(read_code);
    // An unknown start object restarts the stream at the beginning
    let start = if category.contains(&object_id) && identification.objects.contains_key(&object_id)
    {
        object_id
    } else {
        *category.start()
    };

    let mut budget = MAX_PDU_SIZE - DEVICE_ID_HEADER_LEN;
    let mut device_id_objects = Vec::new();
    let mut next_object_id = None;
    for (&id, value) in identification.objects.range(start..=*category.end()) {
        let len = 2 + value.len();
        if len > budget {
            if device_id_objects.is_empty() {
                // A single object must always be answered, even if truncated
                device_id_objects.push(DeviceIdObject::new(id, value.slice(..budget - 2)));
            } else {
                next_object_id = Some(id);
            }
            break;
        }
        budget -= len;
        device_id_objects.push(DeviceIdObject::new(id, value.clone()));
    }
    if device_id_objects.is_empty() {
        return Err(ExceptionCode::IllegalDataAddress);
    }

    Ok(ReadDeviceIdentificationResponse {
        read_code,
        conformity_level,
        more_follows: next_object_id.is_some(),
        next_object_id: next_object_id.unwrap_or_default(),
        device_id_objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        bits::BitVector,
        frame::{ConformityLevel, FileRecordRequest},
        image::SimpleProcessImage,
    };

    fn image() -> SimpleProcessImage {
        let image = SimpleProcessImage::with_sizes(16, 16, 16, 16);
        image.set_holding_registers(0, &[10, 20, 30, 40]).unwrap();
        image.set_input_registers(0, &[1234, 5678]).unwrap();
        image
    }

    #[test]
    fn read_holding_registers() {
        let response = Request::ReadHoldingRegisters(1, 2).execute(&image()).unwrap();
        assert_eq!(response, Response::ReadHoldingRegisters(vec![20, 30]));
    }

    #[test]
    fn quantities_out_of_range_are_illegal_values() {
        let image = image();
        for request in [
            Request::ReadCoils(0, 0),
            Request::ReadCoils(0, MAX_BITS + 1),
            Request::ReadInputRegisters(0, 126),
            Request::WriteMultipleRegisters(0, vec![0; 124]),
            Request::WriteMultipleRegisters(0, vec![]),
            Request::ReadWriteMultipleRegisters(0, 1, 0, vec![0; 122]),
            Request::ReadWriteMultipleRegisters(0, 126, 0, vec![0]),
        ] {
            assert_eq!(
                request.execute(&image).unwrap_err(),
                ExceptionCode::IllegalDataValue,
                "{request:?}"
            );
        }
    }

    #[test]
    fn addresses_out_of_range_are_illegal_addresses() {
        assert_eq!(
            Request::ReadInputRegisters(15, 2)
                .execute(&image())
                .unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn write_multiple_coils() {
        // Given
        let image = image();
        let coils = BitVector::from(vec![true, false, true]);

        // When
        let response = Request::WriteMultipleCoils(2, coils).execute(&image).unwrap();

        // Then
        assert_eq!(response, Response::WriteMultipleCoils(2, 3));
        assert_eq!(image.read_coils(2, 3).unwrap().to_vec(), vec![true, false, true]);
    }

    #[test]
    fn mask_write_register() {
        let image = image();
        image.set_holding_registers(4, &[0x12]).unwrap();

        let response = Request::MaskWriteRegister(4, 0xF2, 0x25)
            .execute(&image)
            .unwrap();

        assert_eq!(response, Response::MaskWriteRegister(4, 0xF2, 0x25));
        assert_eq!(image.read_holding_registers(4, 1).unwrap(), vec![0x17]);
    }

    #[test]
    fn read_write_multiple_registers_writes_first() {
        let image = image();

        let response = Request::ReadWriteMultipleRegisters(0, 3, 1, vec![0xAA, 0xBB])
            .execute(&image)
            .unwrap();

        assert_eq!(
            response,
            Response::ReadWriteMultipleRegisters(vec![10, 0xAA, 0xBB])
        );
    }

    #[test]
    fn read_file_record() {
        let image = image();
        image.set_file_record(4, 1, vec![0x0DFE, 0x0020]);
        image.set_file_record(3, 9, vec![0x33CD, 0x0040]);
        let requests = vec![
            FileRecordRequest {
                file_number: 4,
                record_number: 1,
                record_length: 2,
            },
            FileRecordRequest {
                file_number: 3,
                record_number: 9,
                record_length: 2,
            },
        ];

        let response = Request::ReadFileRecord(requests).execute(&image).unwrap();

        assert_eq!(
            response,
            Response::ReadFileRecord(vec![vec![0x0DFE, 0x0020], vec![0x33CD, 0x0040]])
        );
    }

    #[test]
    fn diagnostics_echoes_query_data() {
        let image = image();
        assert_eq!(
            Request::Diagnostics(0, 0xA537).execute(&image).unwrap(),
            Response::Diagnostics(0, 0xA537)
        );
        assert_eq!(
            Request::Diagnostics(0x0A, 0).execute(&image).unwrap_err(),
            ExceptionCode::IllegalFunction
        );
    }

    #[test]
    fn serial_only_functions_without_status_are_illegal() {
        let image = image();
        for request in [
            Request::ReadExceptionStatus,
            Request::GetCommEventCounter,
            Request::GetCommEventLog,
            Request::ReportSlaveId,
            Request::IllegalFunction(0x41, bytes::Bytes::new()),
        ] {
            assert_eq!(
                request.execute(&image).unwrap_err(),
                ExceptionCode::IllegalFunction
            );
        }
    }

    #[test]
    fn fifo_queue() {
        let image = image();
        image.set_fifo_queue(0x04DE, [0x01B8, 0x1284]);
        assert_eq!(
            Request::ReadFifoQueue(0x04DE).execute(&image).unwrap(),
            Response::ReadFifoQueue(vec![0x01B8, 0x1284])
        );
    }

    fn identified_image() -> SimpleProcessImage {
        let image = SimpleProcessImage::new();
        image.set_device_identification(
            DeviceIdentification::basic("slowtec", "ME-1", "0.1")
                .with_object(0x05, "engine")
                .with_object(0x80, "private")
                .conformity_level(ConformityLevel::Extended),
        );
        image
    }

    #[test]
    fn basic_stream_returns_basic_objects() {
        // When
        let response = Request::ReadDeviceIdentification(ReadCode::Basic, 0)
            .execute(&identified_image())
            .unwrap();

        // Then
        let Response::ReadDeviceIdentification(rsp) = response else {
            unreachable!();
        };
        assert_eq!(rsp.conformity_level, ConformityLevel::Extended);
        assert!(!rsp.more_follows);
        assert_eq!(
            rsp.device_id_objects
                .iter()
                .map(|object| object.id)
                .collect::<Vec<_>>(),
            vec![0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn unknown_start_object_restarts_the_stream() {
        let response = Request::ReadDeviceIdentification(ReadCode::Regular, 0x42)
            .execute(&identified_image())
            .unwrap();

        let Response::ReadDeviceIdentification(rsp) = response else {
            unreachable!();
        };
        assert_eq!(rsp.device_id_objects.len(), 4);
        assert_eq!(rsp.device_id_objects[3].value_as_str(), Some("engine"));
    }

    #[test]
    fn specific_object() {
        let image = identified_image();

        let response = Request::ReadDeviceIdentification(ReadCode::Specific, 0x80)
            .execute(&image)
            .unwrap();
        let missing = Request::ReadDeviceIdentification(ReadCode::Specific, 0x81)
            .execute(&image)
            .unwrap_err();

        let Response::ReadDeviceIdentification(rsp) = response else {
            unreachable!();
        };
        assert_eq!(rsp.device_id_objects, vec![DeviceIdObject::new(0x80, "private")]);
        assert_eq!(missing, ExceptionCode::IllegalDataAddress);
    }

    #[test]
    fn long_stream_is_split() {
        // Given
        let image = SimpleProcessImage::new();
        let identification = (0x80..=0x83).fold(
            DeviceIdentification::basic("a", "b", "c"),
            |identification, id| identification.with_object(id, vec![b'x'; 100]),
        );
        image.set_device_identification(identification);

        // When
        let response = Request::ReadDeviceIdentification(ReadCode::Extended, 0)
            .execute(&image)
            .unwrap();

        // Then
        let Response::ReadDeviceIdentification(rsp) = response else {
            unreachable!();
        };
        assert!(rsp.more_follows);
        assert_eq!(rsp.next_object_id, 0x82);
        assert!(response_pdu_len(&Response::ReadDeviceIdentification(rsp)) <= MAX_PDU_SIZE);
    }
}
