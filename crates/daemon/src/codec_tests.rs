use super::*;
use bytes::BytesMut;
use serde_json::json;

#[test]
fn decodes_one_value_per_line() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"a\":2}\n"[..]);
    let first = codec.decode(&mut buf).expect("decode").expect("some");
    assert_eq!(first, json!({"a": 1}));
    let second = codec.decode(&mut buf).expect("decode").expect("some");
    assert_eq!(second, json!({"a": 2}));
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn skips_blank_lines() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"\n\n{\"ok\":true}\n"[..]);
    let value = codec.decode(&mut buf).expect("decode").expect("some");
    assert_eq!(value, json!({"ok": true}));
}

#[test]
fn tolerates_crlf() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"ok\":true}\r\n"[..]);
    let value = codec.decode(&mut buf).expect("decode").expect("some");
    assert_eq!(value, json!({"ok": true}));
}

#[test]
fn incomplete_line_waits_for_more_data() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"a\":1}"[..]);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    buf.extend_from_slice(b"\n");
    let value = codec.decode(&mut buf).expect("decode").expect("some");
    assert_eq!(value, json!({"a": 1}));
}

#[test]
fn rejects_line_over_limit() {
    let mut codec = JsonRpcCodec::with_max_line_bytes(8);
    let mut buf = BytesMut::from(&b"{\"a\":\"too long for the limit\"}\n"[..]);
    let err = codec.decode(&mut buf).expect_err("should error");
    assert!(matches!(err, FramingError::LineTooLong { limit: 8 }));
}

#[test]
fn rejects_invalid_json() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"not json\n"[..]);
    let err = codec.decode(&mut buf).expect_err("should error");
    assert!(matches!(err, FramingError::InvalidJson(_)));
}

#[test]
fn encode_appends_newline() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(json!({"hello": "world"}), &mut buf).expect("encode");
    assert!(buf.ends_with(b"\n"));
    let decoded: serde_json::Value = serde_json::from_slice(&buf[..buf.len() - 1]).expect("json");
    assert_eq!(decoded, json!({"hello": "world"}));
}
