// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame checksums: CRC16 for RTU and LRC for ASCII.

/// Calculates the Modbus CRC16 of `data`.
///
/// The result is arranged so that writing it big-endian yields the wire order,
/// i.e. the low byte of the polynomial remainder comes first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let crc_odd = (crc & 0x0001) != 0;
            crc >>= 1;
            if crc_odd {
                crc ^= 0xA001;
            }
        }
    }
    crc.rotate_left(8)
}

/// Calculates the Modbus CRC16 of `data` as `[low, high]`, the order of
/// the two checksum bytes on the wire.
#[must_use]
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_be_bytes()
}

/// Calculates the longitudinal redundancy check of `data`.
///
/// `exclude` trailing bytes are left out, e.g. a checksum placeholder at the
/// end of the buffer.
#[must_use]
pub fn lrc(data: &[u8], exclude: usize) -> u8 {
    let end = data.len().saturating_sub(exclude);
    let sum = data[..end]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    sum.wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16(&msg), 0xB663);

        let msg = [0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(crc16(&msg), 0xFBF9);
    }

    #[test]
    fn crc16_bytes_are_in_wire_order() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16_bytes(&msg), [0xB6, 0x63]);
    }

    #[test]
    fn crc16_of_frame_including_checksum_is_zero() {
        let frame = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0xB6, 0x63];
        assert_eq!(crc16(&frame), 0x0000);
    }

    #[test]
    fn crc16_detects_every_single_bit_flip() {
        let msg = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03];
        let reference = crc16(&msg);
        for byte in 0..msg.len() {
            for bit in 0..8 {
                let mut corrupted = msg;
                corrupted[byte] ^= 1 << bit;
                assert_ne!(crc16(&corrupted), reference, "byte {byte}, bit {bit}");
            }
        }
    }

    #[test]
    fn test_lrc() {
        // Read holding registers of unit 0x11, from the serial line guide.
        let msg = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03];
        assert_eq!(lrc(&msg, 0), 0x7E);
        assert_eq!(lrc(&[], 0), 0x00);
    }

    #[test]
    fn lrc_excludes_trailing_bytes() {
        let msg = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x7E];
        assert_eq!(lrc(&msg, 1), 0x7E);
        assert_eq!(lrc(&msg, 10), 0x00);
        // Appending the checksum sums up to zero.
        assert_eq!(lrc(&msg, 0), 0x00);
    }

    #[test]
    fn lrc_detects_every_single_bit_flip() {
        let msg = [0x01, 0x05, 0x00, 0xAC, 0xFF, 0x00];
        let reference = lrc(&msg, 0);
        for byte in 0..msg.len() {
            for bit in 0..8 {
                let mut corrupted = msg;
                corrupted[byte] ^= 1 << bit;
                assert_ne!(lrc(&corrupted, 0), reference, "byte {byte}, bit {bit}");
            }
        }
    }
}
