//! Byte-layout tests for primitive encodings and their short-buffer errors.

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// Integers
// ------------------------------------------------------------------------------------------------

#[test]
fn integers_are_little_endian() {
    let mut buf = Vec::new();
    0xABu8.encode_to(&mut buf).unwrap();
    0x1234u16.encode_to(&mut buf).unwrap();
    0xDEAD_BEEFu32.encode_to(&mut buf).unwrap();
    0x0102_0304_0506_0708u64.encode_to(&mut buf).unwrap();
    assert_eq!(
        buf,
        [
            0xAB, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02,
            0x01
        ]
    );

    let (a, n1) = u8::decode_from(&buf).unwrap();
    let (b, n2) = u16::decode_from(&buf[n1..]).unwrap();
    let (c, n3) = u32::decode_from(&buf[n1 + n2..]).unwrap();
    let (d, n4) = u64::decode_from(&buf[n1 + n2 + n3..]).unwrap();
    assert_eq!((a, b, c, d), (0xAB, 0x1234, 0xDEAD_BEEF, 0x0102_0304_0506_0708));
    assert_eq!(n1 + n2 + n3 + n4, buf.len());
}

#[test]
fn short_buffer_reports_needed_and_available() {
    let err = u64::decode_from(&[1, 2, 3]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof {
            needed: 8,
            available: 3
        }
    ));

    let err = u16::decode_from(&[]).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { needed: 2, .. }));
}

// ------------------------------------------------------------------------------------------------
// Byte strings
// ------------------------------------------------------------------------------------------------

#[test]
fn byte_string_is_length_prefixed() {
    let bytes = encode_to_vec(&b"abc".to_vec()).unwrap();
    assert_eq!(bytes, [3, 0, 0, 0, b'a', b'b', b'c']);

    let mut slice_buf = Vec::new();
    b"abc"[..].encode_to(&mut slice_buf).unwrap();
    assert_eq!(slice_buf, bytes);

    let (decoded, consumed) = Vec::<u8>::decode_from(&bytes).unwrap();
    assert_eq!(decoded, b"abc");
    assert_eq!(consumed, 7);
}

#[test]
fn byte_string_truncated_body() {
    let err = Vec::<u8>::decode_from(&[5, 0, 0, 0, 1, 2]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof {
            needed: 5,
            available: 2
        }
    ));
}

// ------------------------------------------------------------------------------------------------
// Option / Vec<T>
// ------------------------------------------------------------------------------------------------

#[test]
fn option_tags() {
    assert_eq!(encode_to_vec(&None::<u32>).unwrap(), [0]);
    assert_eq!(encode_to_vec(&Some(7u32)).unwrap(), [1, 7, 0, 0, 0]);

    let (v, n) = Option::<u32>::decode_from(&[1, 7, 0, 0, 0]).unwrap();
    assert_eq!((v, n), (Some(7), 5));

    let err = Option::<u32>::decode_from(&[9]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::InvalidTag {
            tag: 9,
            type_name: "Option<T>"
        }
    ));
}

#[test]
fn vec_of_byte_strings() {
    let segments = vec![vec![1u8, 2], vec![], vec![3u8]];
    let mut buf = Vec::new();
    encode_vec(&segments, &mut buf).unwrap();
    let (decoded, consumed) = decode_vec::<Vec<u8>>(&buf).unwrap();
    assert_eq!(decoded, segments);
    assert_eq!(consumed, buf.len());
}
