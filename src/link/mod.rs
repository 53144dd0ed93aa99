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

//! Wired link to the lock.
//!
//! Frames travel as 64-byte HID reports; see [`codec`] for the layout.

pub mod codec;
pub mod commands;
pub mod hid;
pub mod link_constants;
pub mod reassembler;
pub mod transport;

pub use codec::{crc16_ccitt, BlockSizing, DecodedFrame, FrameCodec};
pub use commands::{DeviceInfo, DeviceInfo2, FobByteOrder, KeyKind, RelayControl, RelayFraming, SelfTest};
pub use hid::HidProbe;
pub use reassembler::FrameReassembler;
pub use transport::{LinkPort, LinkProbe, LinkTransport};
