//! Wire frames of the VESC serial protocol.
//!
//! The frame format is:
//!
//! Byte        | Meaning
//! ----------- | ---------------------------------------------------
//! 0           | Start marker, 0x02 for small frames
//! 1           | Payload length `n`
//! 2 .. 2+n    | The payload
//! 2+n .. 4+n  | CRC16-CCITT (XMODEM) over the payload, big-endian
//! 4+n         | End marker 0x03
//!
//! Large frames (start marker 0x03, 16-bit length) exist in the protocol but are not
//! supported here.

use crc16::{State, XMODEM};

use crate::error::{Error, Result};

/// Start marker of a small frame
pub const SMALL_FRAME_START: u8 = 0x02;
/// Start marker of a large frame
pub const LARGE_FRAME_START: u8 = 0x03;
/// Trailing marker of every frame
pub const FRAME_END: u8 = 0x03;
/// Largest payload a small frame can carry
pub const MAX_SMALL_PAYLOAD: usize = u8::MAX as usize;
/// Marker, length, crc and end marker around the payload of a small frame
pub const SMALL_FRAME_OVERHEAD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVariant {
    /// One length byte, payload up to 255 bytes
    Small,
    /// Two length bytes. Not implemented.
    Large,
}

/// A decoded frame. The trailer has already been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub variant: FrameVariant,
    pub payload: Vec<u8>,
    pub crc: u16,
}

impl Frame {
    /// Build the wire bytes for `payload`.
    pub fn encode(variant: FrameVariant, payload: &[u8]) -> Result<Vec<u8>> {
        if variant == FrameVariant::Large {
            return Err(Error::UnsupportedVariant);
        }
        if payload.len() > MAX_SMALL_PAYLOAD {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        let mut packet = Vec::with_capacity(payload.len() + SMALL_FRAME_OVERHEAD);
        packet.push(SMALL_FRAME_START);
        packet.push(payload.len() as u8);
        packet.extend_from_slice(payload);
        packet.extend_from_slice(&crc(payload).to_be_bytes());
        packet.push(FRAME_END);
        Ok(packet)
    }

    /// Split a bounded candidate into payload and crc.
    ///
    /// The trailer byte is not inspected, the caller is expected to have checked it
    /// while bounding the candidate.
    pub fn decode(candidate: &[u8]) -> Result<Frame> {
        match candidate.first() {
            Some(&SMALL_FRAME_START) => {}
            Some(&LARGE_FRAME_START) => return Err(Error::UnsupportedVariant),
            Some(other) => {
                return Err(Error::Protocol(format!("Unexpected start byte 0x{other:02x}")))
            }
            None => return Err(Error::Protocol("Empty frame".to_string())),
        }

        let length = *candidate
            .get(1)
            .ok_or_else(|| Error::Protocol("Missing length byte".to_string()))? as usize;
        if candidate.len() < length + 4 {
            return Err(Error::Protocol(format!(
                "Frame declares {length} payload bytes but only {} bytes are present",
                candidate.len()
            )));
        }

        let payload = candidate[2..2 + length].to_vec();
        let crc = u16::from_be_bytes([candidate[2 + length], candidate[3 + length]]);
        Ok(Frame { variant: FrameVariant::Small, payload, crc })
    }

    /// Whether the carried crc matches the payload
    pub fn is_valid(&self) -> bool {
        validate(&self.payload, self.crc)
    }
}

/// Check a payload against the crc that came with it
pub fn validate(payload: &[u8], crc_received: u16) -> bool {
    crc(payload) == crc_received
}

/// Compute the CRC check value for the given bytes
pub fn crc(data: &[u8]) -> u16 {
    State::<XMODEM>::calculate(data)
}

#[test]
fn test_checksum() {
    assert_eq!(crc(b"123456789"), 0x31c3);
    assert_eq!(crc(&[]), 0x0000);
}

#[test]
fn test_encode_request() {
    let packet = Frame::encode(FrameVariant::Small, &[0x33, 0x00, 0x00, 0x00, 0xdb]).unwrap();
    assert_eq!(hex::encode(packet), "020533000000db982a03");
}

#[test]
fn test_encode_empty_payload() {
    let packet = Frame::encode(FrameVariant::Small, &[]).unwrap();
    assert_eq!(packet, vec![0x02, 0x00, 0x00, 0x00, 0x03]);
}

#[test]
fn test_encode_too_large() {
    let result = Frame::encode(FrameVariant::Small, &[0u8; 256]);
    assert!(matches!(result, Err(Error::PayloadTooLarge(256))));
}

#[test]
fn test_large_variant_unsupported() {
    assert!(matches!(Frame::encode(FrameVariant::Large, &[1, 2, 3]), Err(Error::UnsupportedVariant)));
    let candidate = hex::decode("0300020102000003").unwrap();
    assert!(matches!(Frame::decode(&candidate), Err(Error::UnsupportedVariant)));
}

#[test]
fn test_roundtrip_all_lengths() {
    for len in [0usize, 1, 2, 5, 64, 254, 255] {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
        let packet = Frame::encode(FrameVariant::Small, &payload).unwrap();
        assert_eq!(packet.len(), len + SMALL_FRAME_OVERHEAD);
        let frame = Frame::decode(&packet).unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.crc, crc(&payload));
        assert!(frame.is_valid());
    }
}

#[test]
fn test_single_bit_flip_fails_validation() {
    let payload = hex::decode("3300000000db01f4").unwrap();
    let packet = Frame::encode(FrameVariant::Small, &payload).unwrap();
    // payload and crc bytes
    for byte in 2..packet.len() - 1 {
        for bit in 0..8 {
            let mut corrupted = packet.clone();
            corrupted[byte] ^= 1 << bit;
            let frame = Frame::decode(&corrupted).unwrap();
            assert!(!frame.is_valid(), "flip of byte {byte} bit {bit} went undetected");
        }
    }
}

#[test]
fn test_decode_truncated() {
    let candidate = hex::decode("020533000000").unwrap();
    assert!(matches!(Frame::decode(&candidate), Err(Error::Protocol(_))));
    assert!(matches!(Frame::decode(&[0x02]), Err(Error::Protocol(_))));
    assert!(matches!(Frame::decode(&[]), Err(Error::Protocol(_))));
}

#[test]
fn test_decode_wrong_start() {
    let candidate = hex::decode("010533000000db982a03").unwrap();
    assert!(matches!(Frame::decode(&candidate), Err(Error::Protocol(_))));
}
