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

//! Wired link identifiers and framing constants.

/// USB vendor id of the lock's provisioning interface.
pub const VENDOR_ID: u16 = 0x2FE3;

/// USB product id of the lock's provisioning interface.
pub const PRODUCT_ID: u16 = 0x0100;

/// HID report size; every frame is a whole number of blocks.
pub const BLOCK_SIZE: usize = 64;

/// Frame sync marker.
pub const SYNC: [u8; 2] = [0x5A, 0x5A];

/// Sync marker plus the 16-bit length header.
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC-16.
pub const CHECKSUM_SIZE: usize = 2;

/// Bytes a frame spends on anything other than the command.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Response offsets (absolute, header included).
pub mod offsets {
    /// First byte of most response fields.
    pub const FIELD_START: usize = 17;

    pub const MAC: usize = 17;
    pub const MAC_LEN: usize = 6;
    pub const IMEI: usize = 23;
    pub const IMEI_LEN: usize = 15;

    pub const ICCID: usize = 39;
    pub const ICCID_LEN: usize = 15;
    pub const BATTERY: usize = 54;

    pub const FOB_ID: usize = 17;
    pub const FOB_ID_LEN: usize = 4;

    pub const RELAY_PAYLOAD: usize = 17;
    /// Inner BLE length byte of a relay response.
    pub const RELAY_LENGTH: usize = 19;
    /// Bytes after the declared inner length that belong to the BLE response.
    pub const RELAY_TRAILER: usize = 3;
}

/// Command family bytes.
pub mod family {
    pub const PROVISION: u8 = 64;
    pub const SELF_TEST: u8 = 65;
    pub const BLE_RELAY: u8 = 170;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overhead() {
        assert_eq!(FRAME_OVERHEAD, 6);
        assert_eq!(offsets::MAC + offsets::MAC_LEN, offsets::IMEI);
        assert_eq!(offsets::ICCID + offsets::ICCID_LEN, offsets::BATTERY);
    }
}
