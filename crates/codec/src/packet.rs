// Path: crates/codec/src/packet.rs

//! The ILP packet envelope: a type octet followed by a length-prefixed body.
//!
//! Only the three ILPv4 packet kinds the connector routes are modeled. The
//! body layouts are fixed by the protocol; every field decodes with the OER
//! primitives from [`crate::oer`].

use crate::oer;
use m2m_types::error::CodecError;

/// Envelope type octet of a Prepare packet.
pub const TYPE_PREPARE: u8 = 12;
/// Envelope type octet of a Fulfill packet.
pub const TYPE_FULFILL: u8 = 13;
/// Envelope type octet of a Reject packet.
pub const TYPE_REJECT: u8 = 14;

/// Length of the fixed ASCII timestamp field (`YYYYMMDDHHmmSSfff`).
pub const TIMESTAMP_LEN: usize = 17;

/// A parsed ILP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Forwards value towards a destination, locked to a condition.
    Prepare {
        /// Amount in the units of the link the packet arrives on.
        amount: u64,
        /// Expiry as a fixed 17-octet ASCII timestamp.
        expires_at: [u8; TIMESTAMP_LEN],
        /// SHA-256 condition the fulfillment must hash to.
        execution_condition: [u8; 32],
        /// ILP address of the receiver.
        destination: String,
        /// End-to-end data, opaque to connectors.
        data: Vec<u8>,
    },
    /// Completes a Prepare by revealing the preimage.
    Fulfill {
        /// Preimage of the Prepare's execution condition.
        fulfillment: [u8; 32],
        /// End-to-end data, opaque to connectors.
        data: Vec<u8>,
    },
    /// Declines a Prepare.
    Reject {
        /// Three-character ILP error code (e.g. `F02`).
        code: [u8; 3],
        /// ILP address of the node that triggered the rejection.
        triggered_by: String,
        /// Human-readable description.
        message: String,
        /// End-to-end data, opaque to connectors.
        data: Vec<u8>,
    },
}

impl Packet {
    /// Decodes one packet from `buf`, requiring the buffer to hold exactly
    /// one envelope with no trailing octets.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let (type_octet, mut offset) = oer::read_u8(buf, 0)?;
        let (body, read) = oer::read_var_octet_string(buf, offset)?;
        offset += read;
        if offset != buf.len() {
            return Err(CodecError::OutOfRange(format!(
                "{} trailing octets after packet envelope",
                buf.len() - offset
            )));
        }
        let packet = match type_octet {
            TYPE_PREPARE => Self::decode_prepare(body)?,
            TYPE_FULFILL => Self::decode_fulfill(body)?,
            TYPE_REJECT => Self::decode_reject(body)?,
            other => {
                return Err(CodecError::OutOfRange(format!(
                    "unknown packet type octet {}",
                    other
                )))
            }
        };
        Ok(packet)
    }

    /// Encodes the packet, appending the envelope to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        let type_octet = match self {
            Self::Prepare {
                amount,
                expires_at,
                execution_condition,
                destination,
                data,
            } => {
                oer::write_u64(&mut body, *amount);
                body.extend_from_slice(expires_at);
                body.extend_from_slice(execution_condition);
                oer::write_var_octet_string(&mut body, destination.as_bytes());
                oer::write_var_octet_string(&mut body, data);
                TYPE_PREPARE
            }
            Self::Fulfill { fulfillment, data } => {
                body.extend_from_slice(fulfillment);
                oer::write_var_octet_string(&mut body, data);
                TYPE_FULFILL
            }
            Self::Reject {
                code,
                triggered_by,
                message,
                data,
            } => {
                body.extend_from_slice(code);
                oer::write_var_octet_string(&mut body, triggered_by.as_bytes());
                oer::write_var_octet_string(&mut body, message.as_bytes());
                oer::write_var_octet_string(&mut body, data);
                TYPE_REJECT
            }
        };
        oer::write_u8(out, type_octet);
        oer::write_var_octet_string(out, &body);
    }

    fn decode_prepare(body: &[u8]) -> Result<Self, CodecError> {
        let mut offset = 0;
        let (amount, read) = oer::read_u64(body, offset)?;
        offset += read;
        let (ts, read) = oer::read_octet_string(body, offset, TIMESTAMP_LEN)?;
        offset += read;
        let mut expires_at = [0u8; TIMESTAMP_LEN];
        expires_at.copy_from_slice(ts);
        let (cond, read) = oer::read_octet_string(body, offset, 32)?;
        offset += read;
        let mut execution_condition = [0u8; 32];
        execution_condition.copy_from_slice(cond);
        let (destination, read) = read_utf8(body, offset)?;
        offset += read;
        let (data, read) = oer::read_var_octet_string(body, offset)?;
        offset += read;
        expect_consumed(body, offset)?;
        Ok(Self::Prepare {
            amount,
            expires_at,
            execution_condition,
            destination,
            data: data.to_vec(),
        })
    }

    fn decode_fulfill(body: &[u8]) -> Result<Self, CodecError> {
        let mut offset = 0;
        let (preimage, read) = oer::read_octet_string(body, offset, 32)?;
        offset += read;
        let mut fulfillment = [0u8; 32];
        fulfillment.copy_from_slice(preimage);
        let (data, read) = oer::read_var_octet_string(body, offset)?;
        offset += read;
        expect_consumed(body, offset)?;
        Ok(Self::Fulfill {
            fulfillment,
            data: data.to_vec(),
        })
    }

    fn decode_reject(body: &[u8]) -> Result<Self, CodecError> {
        let mut offset = 0;
        let (code_bytes, read) = oer::read_octet_string(body, offset, 3)?;
        offset += read;
        let mut code = [0u8; 3];
        code.copy_from_slice(code_bytes);
        let (triggered_by, read) = read_utf8(body, offset)?;
        offset += read;
        let (message, read) = read_utf8(body, offset)?;
        offset += read;
        let (data, read) = oer::read_var_octet_string(body, offset)?;
        offset += read;
        expect_consumed(body, offset)?;
        Ok(Self::Reject {
            code,
            triggered_by,
            message,
            data: data.to_vec(),
        })
    }
}

fn read_utf8(body: &[u8], offset: usize) -> Result<(String, usize), CodecError> {
    let (raw, read) = oer::read_var_octet_string(body, offset)?;
    let s = std::str::from_utf8(raw)
        .map_err(|e| CodecError::OutOfRange(format!("invalid UTF-8 in string field: {}", e)))?;
    Ok((s.to_string(), read))
}

fn expect_consumed(body: &[u8], offset: usize) -> Result<(), CodecError> {
    if offset != body.len() {
        return Err(CodecError::OutOfRange(format!(
            "{} trailing octets in packet body",
            body.len() - offset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prepare() -> Packet {
        Packet::Prepare {
            amount: 1000,
            expires_at: *b"20260801123000000",
            execution_condition: [7u8; 32],
            destination: "g.example.receiver".into(),
            data: vec![0xDE, 0xAD],
        }
    }

    #[test]
    fn prepare_roundtrip() {
        let packet = sample_prepare();
        let mut out = Vec::new();
        packet.encode(&mut out);
        assert_eq!(out[0], TYPE_PREPARE);
        assert_eq!(Packet::decode(&out).unwrap(), packet);
    }

    #[test]
    fn fulfill_roundtrip() {
        let packet = Packet::Fulfill {
            fulfillment: [9u8; 32],
            data: Vec::new(),
        };
        let mut out = Vec::new();
        packet.encode(&mut out);
        assert_eq!(Packet::decode(&out).unwrap(), packet);
    }

    #[test]
    fn reject_roundtrip() {
        let packet = Packet::Reject {
            code: *b"F02",
            triggered_by: "g.example.connector".into(),
            message: "unreachable".into(),
            data: vec![1, 2, 3],
        };
        let mut out = Vec::new();
        packet.encode(&mut out);
        assert_eq!(Packet::decode(&out).unwrap(), packet);
    }

    #[test]
    fn unknown_type_octet_is_rejected() {
        let mut out = Vec::new();
        sample_prepare().encode(&mut out);
        out[0] = 99;
        assert!(matches!(
            Packet::decode(&out),
            Err(CodecError::OutOfRange(_))
        ));
    }

    #[test]
    fn trailing_octets_are_rejected() {
        let mut out = Vec::new();
        sample_prepare().encode(&mut out);
        out.push(0x00);
        assert!(matches!(
            Packet::decode(&out),
            Err(CodecError::OutOfRange(_))
        ));
    }

    #[test]
    fn truncated_body_underflows() {
        let mut out = Vec::new();
        sample_prepare().encode(&mut out);
        // Keep the envelope intact but lie about the body: chop the buffer.
        let truncated = &out[..out.len() - 1];
        assert!(matches!(
            Packet::decode(truncated),
            Err(CodecError::Underflow { .. })
        ));
    }

    #[test]
    fn non_utf8_destination_is_rejected() {
        let mut body = Vec::new();
        crate::oer::write_u64(&mut body, 1);
        body.extend_from_slice(b"20260801123000000");
        body.extend_from_slice(&[0u8; 32]);
        crate::oer::write_var_octet_string(&mut body, &[0xFF, 0xFE]);
        crate::oer::write_var_octet_string(&mut body, &[]);
        let mut out = Vec::new();
        crate::oer::write_u8(&mut out, TYPE_PREPARE);
        crate::oer::write_var_octet_string(&mut out, &body);
        assert!(matches!(
            Packet::decode(&out),
            Err(CodecError::OutOfRange(_))
        ));
    }
}
