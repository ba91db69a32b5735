//! Turn the chunks delivered by the notification stream into frames.
//!
//! Notifications carry arbitrary slices of the byte stream: a frame may be split over
//! several notifications, several frames may share one, and noise may appear in between.
//!
//! Resync rule: bytes in front of the first start marker are dropped, and a candidate
//! whose end marker or crc does not check out loses its start marker, after which the
//! scan resumes at the next marker. The buffer therefore never holds more than one
//! incomplete candidate plus whatever arrived after it.

use crate::frame::{Frame, FRAME_END, SMALL_FRAME_START};

#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pull every complete, valid frame out of the buffer, in stream order.
    pub fn extract_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == SMALL_FRAME_START) else {
                if !self.buffer.is_empty() {
                    log::debug!("Dropping {} bytes without start marker", self.buffer.len());
                    self.buffer.clear();
                }
                break;
            };
            if start > 0 {
                log::debug!("Dropping {start} bytes in front of start marker");
                self.buffer.drain(..start);
            }

            let Some(&length) = self.buffer.get(1) else {
                break;
            };
            let end = length as usize + 4;
            if end + 1 > self.buffer.len() {
                // wait for the rest of the frame
                break;
            }

            if self.buffer[end] != FRAME_END {
                log::debug!("Rejecting candidate: no end marker at offset {end}");
                self.buffer.drain(..1);
                continue;
            }

            match Frame::decode(&self.buffer[..end]) {
                Ok(frame) if frame.is_valid() => {
                    self.buffer.drain(..end + 1);
                    frames.push(frame);
                }
                Ok(frame) => {
                    log::debug!(
                        "Rejecting candidate: crc mismatch for payload {}",
                        hex::encode(&frame.payload)
                    );
                    self.buffer.drain(..1);
                }
                Err(err) => {
                    log::debug!("Rejecting candidate: {err}");
                    self.buffer.drain(..1);
                }
            }
        }

        frames
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of buffered bytes not yet consumed into a frame
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
fn packet(payload_hex: &str) -> Vec<u8> {
    let payload = hex::decode(payload_hex).unwrap();
    Frame::encode(crate::frame::FrameVariant::Small, &payload).unwrap()
}

#[test]
fn test_one_byte_at_a_time() {
    let bytes = packet("3300000000db0102030405");
    let mut reassembler = StreamReassembler::new();
    for (i, b) in bytes.iter().enumerate() {
        reassembler.append(&[*b]);
        let frames = reassembler.extract_frames();
        if i + 1 < bytes.len() {
            assert!(frames.is_empty(), "frame extracted early at byte {i}");
        } else {
            assert_eq!(frames.len(), 1);
            assert_eq!(hex::encode(&frames[0].payload), "3300000000db0102030405");
        }
    }
    assert!(reassembler.is_empty());
}

#[test]
fn test_uneven_chunks() {
    let bytes = packet("3300000000db02020303");
    let mut reassembler = StreamReassembler::new();
    let mut frames = Vec::new();
    for chunk in bytes.chunks(3) {
        reassembler.append(chunk);
        frames.extend(reassembler.extract_frames());
    }
    assert_eq!(frames.len(), 1);
    assert!(reassembler.is_empty());
}

#[test]
fn test_two_frames_in_one_chunk() {
    let mut bytes = packet("aa01");
    bytes.extend(packet("bb0203"));
    let mut reassembler = StreamReassembler::new();
    reassembler.append(&bytes);
    let frames = reassembler.extract_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload, vec![0xaa, 0x01]);
    assert_eq!(frames[1].payload, vec![0xbb, 0x02, 0x03]);
    assert!(reassembler.is_empty());
}

#[test]
fn test_spurious_marker_before_frame() {
    // 0x02 0x01 looks like a header but is followed by noise
    let mut bytes = hex::decode("ff0201aa55").unwrap();
    bytes.extend(packet("33cafe"));
    let mut reassembler = StreamReassembler::new();
    reassembler.append(&bytes);
    let frames = reassembler.extract_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, vec![0x33, 0xca, 0xfe]);
    assert!(reassembler.is_empty());
}

#[test]
fn test_bad_crc_is_skipped() {
    let mut bytes = packet("335566");
    bytes[3] ^= 0x40;
    bytes.extend(packet("337788"));
    let mut reassembler = StreamReassembler::new();
    reassembler.append(&bytes);
    let frames = reassembler.extract_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, vec![0x33, 0x77, 0x88]);
    assert!(reassembler.is_empty());
}

#[test]
fn test_garbage_does_not_accumulate() {
    let mut reassembler = StreamReassembler::new();
    for _ in 0..1000 {
        reassembler.append(&hex::decode("02010000ff11").unwrap());
        assert!(reassembler.extract_frames().is_empty());
        assert!(reassembler.len() < 8, "buffer grew to {}", reassembler.len());
    }
    reassembler.append(&packet("33"));
    assert_eq!(reassembler.extract_frames().len(), 1);
}

#[test]
fn test_incomplete_frame_is_kept() {
    let bytes = packet("3300000000db");
    let mut reassembler = StreamReassembler::new();
    reassembler.append(&hex::decode("aabb").unwrap());
    reassembler.append(&bytes[..6]);
    assert!(reassembler.extract_frames().is_empty());
    assert_eq!(reassembler.len(), 6);
    reassembler.append(&bytes[6..]);
    assert_eq!(reassembler.extract_frames().len(), 1);
}

#[test]
fn test_reset() {
    let mut reassembler = StreamReassembler::new();
    reassembler.append(&[0x02, 0x10, 0x33]);
    reassembler.extract_frames();
    assert!(!reassembler.is_empty());
    reassembler.reset();
    assert!(reassembler.is_empty());
}
