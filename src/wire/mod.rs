//! Binary layout of the three frame headers used on the wire.
//!
//! All integers are little-endian u16. A sequenced frame is
//! `[seq][ack count: u8][acks..][payload]`, where a `0` entry in the ack
//! list announces an inclusive range given by the following two values.
//! Ranges are accepted on decode only; encoding always writes a plain list.

mod error;

pub use error::FormatError;

/// Most ack entries an encoded frame can carry.
pub const MAX_ACKS: usize = 255;
/// Longest client id an encoded frame can carry.
pub const MAX_CLIENT_ID_LEN: usize = 255;

fn read_u16(buf: &[u8], at: usize, field: &'static str) -> Result<u16, FormatError> {
    if buf.len() < at + 2 {
        return Err(FormatError::Truncated {
            field,
            needed: at + 2 - buf.len(),
        });
    }
    Ok(u16::from_le_bytes([buf[at], buf[at + 1]]))
}

/// Prefixes `payload` with a sequence number and a selective ack list.
pub fn encode_seq_ack(seq: u16, acks: &[u16], payload: &[u8]) -> Result<Vec<u8>, FormatError> {
    if acks.len() > MAX_ACKS {
        return Err(FormatError::TooManyAcks {
            count: acks.len(),
            max: MAX_ACKS,
        });
    }
    let mut out = Vec::with_capacity(3 + acks.len() * 2 + payload.len());
    out.extend_from_slice(&seq.to_le_bytes());
    out.push(acks.len() as u8);
    for ack in acks {
        out.extend_from_slice(&ack.to_le_bytes());
    }
    out.extend_from_slice(payload);
    Ok(out)
}

/// Splits a frame into its sequence number, expanded ack list, and payload.
pub fn decode_seq_ack(buf: &[u8]) -> Result<(u16, Vec<u16>, &[u8]), FormatError> {
    let seq = read_u16(buf, 0, "sequence number")?;
    let count = *buf.get(2).ok_or(FormatError::Truncated {
        field: "ack count",
        needed: 1,
    })? as usize;

    let mut acks = Vec::with_capacity(count);
    let mut at = 3;
    for _ in 0..count {
        let entry = read_u16(buf, at, "ack entry")?;
        at += 2;
        if entry == 0 {
            let start = read_u16(buf, at, "ack range start")?;
            let end = read_u16(buf, at + 2, "ack range end")?;
            at += 4;
            for ack in start..=end {
                acks.push(ack);
            }
        } else {
            acks.push(entry);
        }
    }
    Ok((seq, acks, &buf[at..]))
}

/// Prefixes `payload` with a session id.
pub fn encode_session_id(session_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&session_id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Splits a frame into its session id and payload.
pub fn decode_session_id(buf: &[u8]) -> Result<(u16, &[u8]), FormatError> {
    let session_id = read_u16(buf, 0, "session id")?;
    Ok((session_id, &buf[2..]))
}

/// Prefixes `payload` with a length-tagged client id.
pub fn encode_client_id(client_id: &[u8], payload: &[u8]) -> Result<Vec<u8>, FormatError> {
    if client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(FormatError::IdTooLong {
            len: client_id.len(),
            max: MAX_CLIENT_ID_LEN,
        });
    }
    let mut out = Vec::with_capacity(1 + client_id.len() + payload.len());
    out.push(client_id.len() as u8);
    out.extend_from_slice(client_id);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Splits a frame into its client id and payload.
pub fn decode_client_id(buf: &[u8]) -> Result<(&[u8], &[u8]), FormatError> {
    let len = *buf.first().ok_or(FormatError::Truncated {
        field: "client id length",
        needed: 1,
    })? as usize;
    if buf.len() < 1 + len {
        return Err(FormatError::Truncated {
            field: "client id",
            needed: 1 + len - buf.len(),
        });
    }
    Ok((&buf[1..1 + len], &buf[1 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn seq_ack_decode_with_range() {
        let input = hex("f902020302000005020902010203");
        let (seq, acks, rest) = decode_seq_ack(&input).unwrap();
        assert_eq!(seq, 761);
        assert_eq!(acks, vec![515, 517, 518, 519, 520, 521]);
        assert_eq!(rest, &hex("010203")[..]);
    }

    #[test]
    fn seq_ack_encode_writes_plain_list() {
        let expected = hex("f90206030205020602070208020902010203");
        let out = encode_seq_ack(761, &[515, 517, 518, 519, 520, 521], &hex("010203")).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn seq_ack_minimal_frame() {
        let input = hex("f90200");
        let (seq, acks, rest) = decode_seq_ack(&input).unwrap();
        assert_eq!(seq, 761);
        assert!(acks.is_empty());
        assert!(rest.is_empty());
        assert_eq!(encode_seq_ack(761, &[], &[]).unwrap(), input);
    }

    #[test]
    fn seq_ack_decode_truncated() {
        assert!(matches!(
            decode_seq_ack(&hex("f9")),
            Err(FormatError::Truncated { .. })
        ));
        // count promises two entries, buffer holds one
        assert!(matches!(
            decode_seq_ack(&hex("0101022301")),
            Err(FormatError::Truncated { .. })
        ));
        // range sentinel without both bounds
        assert!(matches!(
            decode_seq_ack(&hex("01010223010000010202")),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn seq_ack_encode_too_many_acks() {
        let acks = vec![1u16; 260];
        assert_eq!(
            encode_seq_ack(12, &acks, &[]),
            Err(FormatError::TooManyAcks {
                count: 260,
                max: MAX_ACKS
            })
        );
    }

    #[test]
    fn session_id_roundtrip() {
        let input = hex("f9010203");
        let (session_id, rest) = decode_session_id(&input).unwrap();
        assert_eq!(session_id, 505);
        assert_eq!(rest, &hex("0203")[..]);
        assert_eq!(encode_session_id(505, &hex("0203")), input);
    }

    #[test]
    fn session_id_decode_truncated() {
        assert!(matches!(
            decode_session_id(&[0x01]),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn client_id_roundtrip() {
        let input = hex("02f9010203");
        let (client_id, rest) = decode_client_id(&input).unwrap();
        assert_eq!(client_id, &hex("f901")[..]);
        assert_eq!(rest, &hex("0203")[..]);
        assert_eq!(encode_client_id(&hex("f901"), &hex("0203")).unwrap(), input);
    }

    #[test]
    fn client_id_decode_errors() {
        assert!(matches!(
            decode_client_id(&[]),
            Err(FormatError::Truncated { .. })
        ));
        // length byte promises more than the buffer holds
        assert!(matches!(
            decode_client_id(&[3, 0, 0]),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn client_id_encode_too_long() {
        let id = vec![0u8; 260];
        assert_eq!(
            encode_client_id(&id, &[]),
            Err(FormatError::IdTooLong {
                len: 260,
                max: MAX_CLIENT_ID_LEN
            })
        );
    }
}
