//! Bit/byte codec between typed values and PDO fields.
//!
//! PDO entries are little-endian bit fields within a byte-addressed
//! process image. Three layouts exist on the wire:
//!
//! - sub-byte fields (1..=7 bits), possibly spanning a byte boundary
//! - 24-bit fields, possibly shifted by a bit offset into a 4-byte window
//! - byte-aligned power-of-two widths (8/16/32/64 bits)
//!
//! All functions are pure; callers are responsible for bounds-checking the
//! source or destination slice against [`required_bytes`].

use ecat_common::telem::{DataType, SampleValue};

/// Number of bytes a field at bit offset `bit` with `bit_length` bits
/// touches in the image.
pub fn required_bytes(bit: u8, bit_length: u8) -> usize {
    if bit_length < 8 && bit as usize + bit_length as usize > 8 {
        2
    } else if bit_length == 24 && bit > 0 {
        4
    } else {
        bit_length.div_ceil(8) as usize
    }
}

/// Unsigned interpretation for a field whose declared type is unresolved.
pub fn fallback_type(bit_length: u8) -> DataType {
    match bit_length.div_ceil(8) {
        0..=1 => DataType::Uint8,
        2 => DataType::Uint16,
        3..=4 => DataType::Uint32,
        _ => DataType::Uint64,
    }
}

/// Extracts the field at `(bit, bit_length)` from `src` as a value of
/// `data_type`.
///
/// `src` must start at the field's byte offset and hold at least
/// [`required_bytes`] bytes. Sub-byte fields extract as `Uint8`; 24-bit
/// fields extract as `Int32`/`Uint32` with sign extension from bit 23 when
/// the declared type is signed; byte-aligned fields reinterpret the bytes
/// as the declared type directly.
pub fn extract(src: &[u8], bit: u8, bit_length: u8, data_type: DataType) -> SampleValue {
    debug_assert!(src.len() >= required_bytes(bit, bit_length));
    if bit_length < 8 {
        let mut two = src[0] as u16;
        if bit as usize + bit_length as usize > 8 {
            two |= (src[1] as u16) << 8;
        }
        let mask = (1u16 << bit_length) - 1;
        SampleValue::Uint8(((two >> bit) & mask) as u8)
    } else if bit_length == 24 {
        let mut raw =
            u32::from(src[0]) | (u32::from(src[1]) << 8) | (u32::from(src[2]) << 16);
        if bit > 0 {
            raw = (raw >> bit) | (u32::from(src[3]) << (24 - bit));
        }
        let mut val = raw & 0x00FF_FFFF;
        if data_type.is_signed() {
            if val & 0x0080_0000 != 0 {
                val |= 0xFF00_0000;
            }
            SampleValue::Int32(val as i32)
        } else {
            SampleValue::Uint32(val)
        }
    } else {
        let mut ty = if data_type == DataType::Unknown {
            fallback_type(bit_length)
        } else {
            data_type
        };
        if src.len() < ty.density() {
            ty = fallback_type(bit_length);
        }
        SampleValue::from_le_bytes(ty, src).unwrap_or(SampleValue::Uint8(0))
    }
}

/// Inserts `value` into the field at `(bit, bit_length)` in `dest`.
///
/// The dual of [`extract`]: sub-byte and shifted 24-bit fields
/// read-modify-write their window, leaving neighboring bits untouched;
/// byte-aligned fields copy the value's little-endian encoding. `dest`
/// must start at the field's byte offset and hold at least
/// [`required_bytes`] bytes. The value must already be cast to the
/// field's declared type.
pub fn insert(dest: &mut [u8], bit: u8, bit_length: u8, value: SampleValue) {
    debug_assert!(dest.len() >= required_bytes(bit, bit_length));
    if bit_length < 8 {
        let src_val = value.as_u64() as u16;
        let mask = (1u16 << bit_length) - 1;
        if bit as usize + bit_length as usize > 8 {
            let mut two = u16::from(dest[0]) | (u16::from(dest[1]) << 8);
            let shifted_mask = mask << bit;
            let shifted_val = (src_val & mask) << bit;
            two = (two & !shifted_mask) | shifted_val;
            dest[0] = (two & 0xFF) as u8;
            dest[1] = (two >> 8) as u8;
        } else {
            let mask = mask as u8;
            let shifted_mask = mask << bit;
            let shifted_val = ((src_val as u8) & mask) << bit;
            dest[0] = (dest[0] & !shifted_mask) | shifted_val;
        }
    } else if bit_length == 24 {
        let masked = (value.as_u64() as u32) & 0x00FF_FFFF;
        if bit > 0 {
            let mut four = u32::from_le_bytes([dest[0], dest[1], dest[2], dest[3]]);
            let write_mask = 0x00FF_FFFFu32 << bit;
            four = (four & !write_mask) | (masked << bit);
            dest[..4].copy_from_slice(&four.to_le_bytes());
        } else {
            dest[0] = (masked & 0xFF) as u8;
            dest[1] = ((masked >> 8) & 0xFF) as u8;
            dest[2] = ((masked >> 16) & 0xFF) as u8;
        }
    } else {
        let byte_len = bit_length.div_ceil(8) as usize;
        let (buf, n) = value.to_le_bytes();
        let n = n.min(byte_len);
        dest[..n].copy_from_slice(&buf[..n]);
        for b in &mut dest[n..byte_len] {
            *b = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn required_bytes_cases() {
        assert_eq!(required_bytes(0, 4), 1);
        assert_eq!(required_bytes(6, 4), 2);
        assert_eq!(required_bytes(0, 8), 1);
        assert_eq!(required_bytes(0, 16), 2);
        assert_eq!(required_bytes(0, 24), 3);
        assert_eq!(required_bytes(3, 24), 4);
        assert_eq!(required_bytes(0, 64), 8);
    }

    #[test]
    fn extract_sub_byte_low_nibble() {
        let src = [0xAFu8];
        assert_eq!(
            extract(&src, 0, 4, DataType::Uint8),
            SampleValue::Uint8(0x0F)
        );
        assert_eq!(
            extract(&src, 4, 4, DataType::Uint8),
            SampleValue::Uint8(0x0A)
        );
    }

    #[test]
    fn extract_sub_byte_spanning_boundary() {
        // 4 bits at bit offset 6: low 2 bits from byte 0, high 2 from byte 1.
        let src = [0b1100_0000u8, 0b0000_0011u8];
        assert_eq!(
            extract(&src, 6, 4, DataType::Uint8),
            SampleValue::Uint8(0b1111)
        );
    }

    #[test]
    fn extract_signed_24_bit_negative() {
        let src = [0xFFu8, 0xFF, 0xFF];
        assert_eq!(extract(&src, 0, 24, DataType::Int32), SampleValue::Int32(-1));
    }

    #[test]
    fn extract_unsigned_24_bit_no_sign_extension() {
        let src = [0xFFu8, 0xFF, 0xFF];
        assert_eq!(
            extract(&src, 0, 24, DataType::Uint32),
            SampleValue::Uint32(0x00FF_FFFF)
        );
    }

    #[test]
    fn extract_24_bit_with_bit_offset() {
        // Value 0x123456 shifted left by 3 into a 4-byte window.
        let mut dest = [0u8; 4];
        insert(&mut dest, 3, 24, SampleValue::Uint32(0x0012_3456));
        assert_eq!(
            extract(&dest, 3, 24, DataType::Uint32),
            SampleValue::Uint32(0x0012_3456)
        );
    }

    #[test]
    fn extract_byte_aligned_int16() {
        let src = 0x1234i16.to_le_bytes();
        assert_eq!(
            extract(&src, 0, 16, DataType::Int16),
            SampleValue::Int16(0x1234)
        );
    }

    #[test]
    fn extract_unknown_type_falls_back_to_unsigned() {
        let src = 0xBEEFu16.to_le_bytes();
        assert_eq!(
            extract(&src, 0, 16, DataType::Unknown),
            SampleValue::Uint16(0xBEEF)
        );
    }

    #[test]
    fn insert_sub_byte_preserves_neighbors() {
        let mut dest = [0xFFu8];
        insert(&mut dest, 2, 2, SampleValue::Uint8(0));
        assert_eq!(dest[0], 0b1111_0011);
    }

    #[test]
    fn insert_24_bit_no_offset_little_endian() {
        let mut dest = [0u8; 3];
        insert(&mut dest, 0, 24, SampleValue::Int32(0x0012_3456));
        assert_eq!(dest, [0x56, 0x34, 0x12]);
    }

    #[test]
    fn insert_24_bit_negative() {
        let mut dest = [0u8; 3];
        insert(&mut dest, 0, 24, SampleValue::Int32(-1));
        assert_eq!(dest, [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn insert_shifted_24_bit_preserves_surrounding_bits() {
        let mut dest = [0xFFu8; 4];
        insert(&mut dest, 4, 24, SampleValue::Uint32(0));
        let four = u32::from_le_bytes(dest);
        assert_eq!(four, !(0x00FF_FFFFu32 << 4));
    }

    #[test]
    fn insert_byte_aligned_int64() {
        let mut dest = [0u8; 8];
        insert(&mut dest, 0, 64, SampleValue::Int64(-2));
        assert_eq!(dest, (-2i64).to_le_bytes());
    }

    proptest! {
        #[test]
        fn round_trip_sub_byte(len in 1u8..8, bit in 0u8..8, raw in 0u8..=255) {
            let value = raw & ((1u16 << len) - 1) as u8;
            let mut buf = [0u8; 2];
            insert(&mut buf, bit, len, SampleValue::Uint8(value));
            prop_assert_eq!(
                extract(&buf, bit, len, DataType::Uint8),
                SampleValue::Uint8(value)
            );
        }

        #[test]
        fn round_trip_24_bit_unsigned(bit in 0u8..8, raw in 0u32..0x0100_0000) {
            let mut buf = [0u8; 4];
            insert(&mut buf, bit, 24, SampleValue::Uint32(raw));
            prop_assert_eq!(
                extract(&buf, bit, 24, DataType::Uint32),
                SampleValue::Uint32(raw)
            );
        }

        #[test]
        fn round_trip_24_bit_signed(bit in 0u8..8, raw in -0x0080_0000i32..0x0080_0000) {
            let mut buf = [0u8; 4];
            insert(&mut buf, bit, 24, SampleValue::Int32(raw));
            prop_assert_eq!(
                extract(&buf, bit, 24, DataType::Int32),
                SampleValue::Int32(raw)
            );
        }

        #[test]
        fn round_trip_uint8(raw in any::<u8>()) {
            let mut buf = [0u8; 1];
            insert(&mut buf, 0, 8, SampleValue::Uint8(raw));
            prop_assert_eq!(
                extract(&buf, 0, 8, DataType::Uint8),
                SampleValue::Uint8(raw)
            );
        }

        #[test]
        fn round_trip_int32(raw in any::<i32>()) {
            let mut buf = [0u8; 4];
            insert(&mut buf, 0, 32, SampleValue::Int32(raw));
            prop_assert_eq!(
                extract(&buf, 0, 32, DataType::Int32),
                SampleValue::Int32(raw)
            );
        }

        #[test]
        fn round_trip_int16(raw in any::<i16>()) {
            let mut buf = [0u8; 2];
            insert(&mut buf, 0, 16, SampleValue::Int16(raw));
            prop_assert_eq!(
                extract(&buf, 0, 16, DataType::Int16),
                SampleValue::Int16(raw)
            );
        }

        #[test]
        fn round_trip_uint64(raw in any::<u64>()) {
            let mut buf = [0u8; 8];
            insert(&mut buf, 0, 64, SampleValue::Uint64(raw));
            prop_assert_eq!(
                extract(&buf, 0, 64, DataType::Uint64),
                SampleValue::Uint64(raw)
            );
        }

        #[test]
        fn round_trip_float32(raw in any::<f32>().prop_filter("finite", |f| f.is_finite())) {
            let mut buf = [0u8; 4];
            insert(&mut buf, 0, 32, SampleValue::Float32(raw));
            prop_assert_eq!(
                extract(&buf, 0, 32, DataType::Float32),
                SampleValue::Float32(raw)
            );
        }

        #[test]
        fn sub_byte_insert_touches_only_its_window(
            len in 1u8..8,
            bit in 0u8..8,
            raw in any::<u8>(),
            background in any::<[u8; 2]>(),
        ) {
            let mut buf = background;
            insert(&mut buf, bit, len, SampleValue::Uint8(raw));
            let window = (((1u16 << len) - 1) << bit) as u16;
            let before = u16::from_le_bytes(background);
            let after = u16::from_le_bytes(buf);
            prop_assert_eq!(before & !window, after & !window);
        }
    }
}
