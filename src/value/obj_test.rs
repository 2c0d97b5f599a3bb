// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for typed values and their serialization.

#[cfg(test)]
mod tests {
    use crate::codec::serial::{SerializedReader, SerializedWriter};
    use crate::map::ConcurrentHashMap;
    use crate::sync::list::LockFreeList;
    use crate::value::obj::{
        deserialize_value, parse_i64, serialize_value, Value, TAG_INTEGER, TAG_STRING,
    };
    use std::io;
    use std::sync::Arc;

    fn round_trip(value: &Value) -> (Vec<u8>, Arc<Value>) {
        let mut writer = SerializedWriter::new(Vec::new());
        let written = serialize_value(value, &mut writer).unwrap();
        let buf = writer.into_inner();
        assert_eq!(written, buf.len());
        let mut reader = SerializedReader::new(buf.as_slice());
        let decoded = deserialize_value(&mut reader).unwrap();
        (buf, decoded)
    }

    #[test]
    fn test_integer_round_trip() {
        for v in [0i64, 111, -111, i64::MIN, i64::MAX] {
            let (_, decoded) = round_trip(&Value::Integer(v));
            assert_eq!(decoded.as_int(), Some(v));
        }
        // 111 zigzags to 222, [0xde, 0x01] after the tag.
        let (buf, _) = round_trip(&Value::Integer(111));
        assert_eq!(buf, vec![TAG_INTEGER, 0xde, 0x01]);
    }

    #[test]
    fn test_string_round_trip() {
        let (buf, decoded) = round_trip(&Value::String(b"Jake".to_vec()));
        assert_eq!(buf, vec![TAG_STRING, 4, b'J', b'a', b'k', b'e']);
        assert_eq!(decoded.as_bytes(), Some(&b"Jake"[..]));

        let (_, empty) = round_trip(&Value::String(Vec::new()));
        assert_eq!(empty.as_bytes(), Some(&b""[..]));
    }

    #[test]
    fn test_list_round_trip_preserves_order() {
        let list = LockFreeList::new();
        list.push_back(Value::string("a"));
        list.push_back(Value::integer(2));
        list.push_back(Value::string("c"));
        let (_, decoded) = round_trip(&Value::List(list));

        match &*decoded {
            Value::List(decoded_list) => {
                let items: Vec<_> = decoded_list.iter().cloned().collect();
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].as_bytes(), Some(&b"a"[..]));
                assert_eq!(items[1].as_int(), Some(2));
                assert_eq!(items[2].as_bytes(), Some(&b"c"[..]));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_round_trip() {
        let map = ConcurrentHashMap::new(33);
        let _ = map.put(b"name", 0, Value::string("jake"));
        let _ = map.put(b"id", 0, Value::integer(100));
        let (_, decoded) = round_trip(&Value::Hash(map));

        match &*decoded {
            Value::Hash(decoded_map) => {
                assert_eq!(decoded_map.num_keys(), 2);
                let (_, name) = decoded_map.get(b"name").unwrap();
                assert_eq!(name.as_bytes(), Some(&b"jake"[..]));
                let (_, id) = decoded_map.get(b"id").unwrap();
                assert_eq!(id.as_int(), Some(100));
            }
            other => panic!("expected hash, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_list_in_list() {
        let inner = LockFreeList::new();
        inner.push_back(Value::integer(1));
        let outer = LockFreeList::new();
        outer.push_back(Arc::new(Value::List(inner)));
        outer.push_back(Value::string("tail"));
        let (_, decoded) = round_trip(&Value::List(outer));
        match &*decoded {
            Value::List(list) => assert_eq!(list.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_tag_is_invalid_data() {
        let mut reader = SerializedReader::new([9u8, 0].as_slice());
        let err = deserialize_value(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_is_eof() {
        let mut reader = SerializedReader::new([TAG_STRING, 10, b'x'].as_slice());
        let err = deserialize_value(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64(b"0"), Some(0));
        assert_eq!(parse_i64(b"12345"), Some(12345));
        assert_eq!(parse_i64(b"-42"), Some(-42));
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b"-"), None);
        assert_eq!(parse_i64(b"12x"), None);
        assert_eq!(parse_i64(b"99999999999999999999"), None);
    }

    #[test]
    fn test_as_int_coerces_strings() {
        assert_eq!(Value::string("17").as_int(), Some(17));
        assert_eq!(Value::string("nope").as_int(), None);
        assert_eq!(Value::integer(-5).as_int(), Some(-5));
    }
}
