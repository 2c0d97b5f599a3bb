// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for varint encoding.

#[cfg(test)]
mod tests {
    use crate::codec::varint::*;

    #[test]
    fn test_encode64_boundaries() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (0x7f, 1),
            (0x80, 2),
            (0x3fff, 2),
            (0x4000, 3),
            (u64::from(u32::MAX), 5),
            (u64::MAX, 10),
        ];
        for &(value, expect_len) in cases {
            let mut buf = [0u8; MAX64_LEN];
            let n = encode64(value, &mut buf);
            assert_eq!(n, expect_len, "value {}", value);
            assert_eq!(sizeof64(value), expect_len);
            let (decoded, consumed) = decode64(&buf[..n]).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, n);
        }
    }

    #[test]
    fn test_encode32_round_trip() {
        for value in [0u32, 1, 127, 128, 300, 65535, u32::MAX] {
            let mut buf = [0u8; MAX32_LEN];
            let n = encode32(value, &mut buf);
            let (decoded, consumed) = decode32(&buf[..n]).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, n);
        }
    }

    #[test]
    fn test_zigzag_known_value() {
        // 111 folds to 222, which encodes as [0xde, 0x01].
        assert_eq!(zigzag64(111), 222);
        let mut buf = [0u8; MAX64_LEN];
        let n = encode64(zigzag64(111), &mut buf);
        assert_eq!(&buf[..n], &[0xde, 0x01]);
        assert_eq!(unzigzag64(222), 111);
    }

    #[test]
    fn test_zigzag_round_trip() {
        for value in [0i64, -1, 1, -2, 2, i64::MIN, i64::MAX, -123456789] {
            assert_eq!(unzigzag64(zigzag64(value)), value);
        }
    }

    #[test]
    fn test_decode_truncated() {
        // Continuation bit set but no next byte.
        assert!(decode64(&[0x80]).is_none());
        assert!(decode64(&[]).is_none());
    }

    #[test]
    fn test_decode32_rejects_wide_value() {
        let mut buf = [0u8; MAX64_LEN];
        let n = encode64(u64::from(u32::MAX) + 1, &mut buf);
        assert!(decode32(&buf[..n]).is_none());
    }
}
