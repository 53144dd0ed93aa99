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

//! Link report reassembly.

use tracing::{debug, warn};

use super::link_constants::{BLOCK_SIZE, CHECKSUM_SIZE, HEADER_SIZE, SYNC};

/// Reassembles HID reports into complete frames.
///
/// Assumes one frame in flight at a time.
pub struct FrameReassembler {
    buffer: Vec<u8>,
    declared_length: Option<usize>,
}

impl FrameReassembler {
    /// Create a new frame reassembler.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(BLOCK_SIZE * 4),
            declared_length: None,
        }
    }

    /// Process an incoming report.
    ///
    /// Returns `Some(frame)` once `buffered - 2 >= declared`, otherwise `None`.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let declared = match self.declared_length {
            Some(declared) => declared,
            None => {
                if chunk.len() < HEADER_SIZE || chunk[..2] != SYNC {
                    warn!("Dropping {}-byte report without a pending frame", chunk.len());
                    return None;
                }
                let declared = u16::from_be_bytes([chunk[2], chunk[3]]) as usize;
                debug!("Started frame reassembly, declared length {}", declared);
                self.declared_length = Some(declared);
                declared
            }
        };

        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() - CHECKSUM_SIZE >= declared {
            debug!("Frame reassembly complete: {} bytes", self.buffer.len());
            self.declared_length = None;
            return Some(std::mem::take(&mut self.buffer));
        }

        None
    }

    /// Reset the reassembler state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.declared_length = None;
    }

    /// Check if reassembly is in progress.
    pub fn is_in_progress(&self) -> bool {
        self.declared_length.is_some()
    }

    /// Get current buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a frame into link reports.
pub fn chunk_frame(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.chunks(BLOCK_SIZE)
}
