// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame encoding and validation.
//!
//! A frame is `5A 5A | length (BE) | command | zero padding | CRC-16 (BE)`,
//! always a whole number of 64-byte blocks. The length header counts every
//! byte except the trailing checksum.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::link_constants::{BLOCK_SIZE, CHECKSUM_SIZE, FRAME_OVERHEAD, HEADER_SIZE, SYNC};
use crate::error::ProtocolError;

/// How many blocks a command is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockSizing {
    /// `ceil((len + 6) / 64)`: always leaves room for header and checksum.
    #[default]
    ReserveOverhead,
    /// `ceil(len / 64)`, as older host tools computed it. Commands that do not
    /// leave six spare bytes in the last block are rejected.
    Legacy,
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// A received frame that passed header validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    bytes: Vec<u8>,
    declared_length: usize,
}

impl DecodedFrame {
    /// The whole frame; response fields are addressed by absolute offset.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Command and padding, without header or checksum.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..self.declared_length]
    }

    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    /// Checksum carried by the frame.
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([
            self.bytes[self.declared_length],
            self.bytes[self.declared_length + 1],
        ])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encoder/decoder for link frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    sizing: BlockSizing,
    strict_checksum: bool,
}

impl FrameCodec {
    pub fn new(sizing: BlockSizing, strict_checksum: bool) -> Self {
        Self {
            sizing,
            strict_checksum,
        }
    }

    /// Number of blocks a command of `len` bytes is framed into.
    pub fn block_count(&self, len: usize) -> Result<usize, ProtocolError> {
        match self.sizing {
            BlockSizing::ReserveOverhead => Ok((len + FRAME_OVERHEAD).div_ceil(BLOCK_SIZE)),
            BlockSizing::Legacy => {
                let blocks = len.div_ceil(BLOCK_SIZE);
                let capacity = blocks * BLOCK_SIZE - FRAME_OVERHEAD;
                if len > capacity {
                    return Err(ProtocolError::BlockOverflow { len, capacity });
                }
                Ok(blocks)
            }
        }
    }

    /// Frame a command.
    pub fn encode(&self, command: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if command.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }

        let frame_len = self.block_count(command.len())? * BLOCK_SIZE;
        let declared = frame_len - CHECKSUM_SIZE;
        let declared_header =
            u16::try_from(declared).map_err(|_| ProtocolError::FrameTooLarge { len: frame_len })?;

        let mut frame = Vec::with_capacity(frame_len);
        frame.extend_from_slice(&SYNC);
        frame.extend_from_slice(&declared_header.to_be_bytes());
        frame.extend_from_slice(command);
        frame.resize(declared, 0);

        let checksum = crc16_ccitt(&frame[SYNC.len()..]);
        frame.extend_from_slice(&checksum.to_be_bytes());

        debug!(
            "Encoded {}-byte command into {} block(s), crc {:#06x}",
            command.len(),
            frame_len / BLOCK_SIZE,
            checksum
        );
        Ok(frame)
    }

    /// Validate a reassembled frame.
    ///
    /// The checksum is only verified in strict mode; the firmware's replies
    /// have historically been accepted as-is.
    pub fn decode(&self, frame: Vec<u8>) -> Result<DecodedFrame, ProtocolError> {
        if frame.len() < HEADER_SIZE + CHECKSUM_SIZE || frame[..2] != SYNC {
            return Err(ProtocolError::BadSync);
        }

        let declared = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        if declared < HEADER_SIZE || frame.len() < declared + CHECKSUM_SIZE {
            return Err(ProtocolError::Truncated {
                declared,
                buffered: frame.len(),
            });
        }

        let decoded = DecodedFrame {
            bytes: frame,
            declared_length: declared,
        };

        let expected = crc16_ccitt(&decoded.bytes[SYNC.len()..declared]);
        let actual = decoded.checksum();
        if expected != actual {
            if self.strict_checksum {
                return Err(ProtocolError::ChecksumMismatch { expected, actual });
            }
            warn!(
                "Accepting frame with checksum {:#06x}, computed {:#06x}",
                actual, expected
            );
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        // Standard check value for CRC-16/CCITT-FALSE.
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_get_device_info_frame() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&[0, 1, 64, 0]).unwrap();

        assert_eq!(frame.len(), 64);
        assert_eq!(&frame[..4], &[0x5A, 0x5A, 0x00, 0x3E]);
        assert_eq!(&frame[4..8], &[0, 1, 64, 0]);
        assert!(frame[8..62].iter().all(|&b| b == 0));
        assert_eq!(&frame[62..], &[0xC0, 0x7C]);
    }

    #[test]
    fn test_frames_fill_whole_blocks() {
        let codec = FrameCodec::default();
        for len in 1..400 {
            let command = vec![0xA5; len];
            let frame = codec.encode(&command).unwrap();
            assert_eq!(frame.len() % BLOCK_SIZE, 0, "len {}", len);

            let declared = u16::from_be_bytes([frame[2], frame[3]]) as usize;
            assert_eq!(declared, frame.len() - 2);

            let checksum = u16::from_be_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
            assert_eq!(checksum, crc16_ccitt(&frame[2..frame.len() - 2]));
        }
    }

    #[test]
    fn test_sizing_modes_agree_where_legacy_fits() {
        let reserve = FrameCodec::new(BlockSizing::ReserveOverhead, false);
        let legacy = FrameCodec::new(BlockSizing::Legacy, false);

        for len in 1..300 {
            let command = vec![7u8; len];
            if let Ok(frame) = legacy.encode(&command) {
                assert_eq!(frame, reserve.encode(&command).unwrap());
            }
        }
    }

    #[test]
    fn test_legacy_overflow_rejected() {
        let legacy = FrameCodec::new(BlockSizing::Legacy, false);
        assert!(matches!(
            legacy.encode(&[1u8; 60]),
            Err(ProtocolError::BlockOverflow { len: 60, capacity: 58 })
        ));
        assert!(matches!(
            legacy.encode(&[1u8; 64]),
            Err(ProtocolError::BlockOverflow { .. })
        ));
        assert_eq!(legacy.encode(&[1u8; 58]).unwrap().len(), 64);

        // The same command simply grows a block when overhead is reserved.
        let reserve = FrameCodec::default();
        assert_eq!(reserve.encode(&[1u8; 60]).unwrap().len(), 128);
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            FrameCodec::default().encode(&[]),
            Err(ProtocolError::EmptyCommand)
        ));
    }

    #[test]
    fn test_decode_and_strict_checksum() {
        let frame = FrameCodec::default().encode(&[0, 1, 65, 5, 0]).unwrap();

        let lenient = FrameCodec::new(BlockSizing::ReserveOverhead, false);
        let strict = FrameCodec::new(BlockSizing::ReserveOverhead, true);

        let decoded = strict.decode(frame.clone()).unwrap();
        assert_eq!(&decoded.payload()[..5], &[0, 1, 65, 5, 0]);
        assert_eq!(decoded.declared_length(), 62);

        let mut corrupted = frame;
        corrupted[10] ^= 0x01;
        assert!(lenient.decode(corrupted.clone()).is_ok());
        assert!(matches!(
            strict.decode(corrupted),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_headers() {
        let codec = FrameCodec::default();
        assert!(matches!(codec.decode(vec![0u8; 64]), Err(ProtocolError::BadSync)));

        let mut frame = codec.encode(&[0, 1, 64, 0]).unwrap();
        frame.truncate(40);
        assert!(matches!(
            codec.decode(frame),
            Err(ProtocolError::Truncated { declared: 62, buffered: 40 })
        ));
    }
}
