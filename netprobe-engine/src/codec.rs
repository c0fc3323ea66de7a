//! Probe frame encoding.
//!
//! Frames are compact JSON objects. Over TCP each frame is followed by a
//! newline; the decoder tolerates the trailing newline and surrounding
//! whitespace so both transports share one decoder.

use netprobe_types::ProbeFrame;

use crate::error::ProtocolError;

/// Encode a probe frame.
pub fn encode(frame: &ProbeFrame) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(frame)
}

/// Decode an echoed probe frame.
pub fn decode(payload: &[u8]) -> Result<ProbeFrame, ProtocolError> {
    Ok(serde_json::from_slice(payload.trim_ascii())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprobe_types::SeqNo;

    #[test]
    fn encoding_is_compact_json() {
        let frame = ProbeFrame::new("a", SeqNo::new(1), 2);
        let bytes = encode(&frame).unwrap();
        assert_eq!(bytes, br#"{"agent_id":"a","seq":1,"t_send_ns":2}"#);
    }

    #[test]
    fn decode_accepts_trailing_newline() {
        let frame = decode(b"{\"agent_id\":\"a\",\"seq\":65535,\"t_send_ns\":9}\n").unwrap();
        assert_eq!(frame.seq_no(), SeqNo::new(65535));
        assert_eq!(frame.t_send_ns, 9);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"hello"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_out_of_range_sequence() {
        let err = decode(br#"{"agent_id":"a","seq":65536,"t_send_ns":1}"#);
        assert!(err.is_err());
    }
}
