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

//! Device command definitions and response decoding.
//!
//! Commands are the raw bytes handed to [`FrameCodec::encode`]. Responses are
//! read by absolute offset into the reassembled frame, header included.
//!
//! [`FrameCodec::encode`]: super::codec::FrameCodec::encode

use serde::{Deserialize, Serialize};

use super::link_constants::{family, offsets};
use crate::error::ProtocolError;

const CSR_END_MARKER: &str = "-----END CERTIFICATE REQUEST-----";

/// Zeroed reserved bytes between the opcode and a bulk payload.
const RESERVED: [u8; 8] = [0; 8];

/// Key material forwarded with the shared "install key" opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyKind {
    RootCa = 1,
    DeviceCa = 2,
    DevicePrivateKey = 3,
}

/// Hardware self-tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SelfTest {
    HallSensor = 1,
    ContactSensor = 2,
    TouchKey = 3,
    NfcFob = 4,
    DeviceInfo2 = 5,
}

/// Byte order of the fob id in a fob test response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FobByteOrder {
    /// What the firmware has been decoded as so far.
    #[default]
    Little,
    Big,
}

/// Relay framings for BLE commands tunneled through the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFraming {
    AddSessionKey,
    Init,
}

impl RelayFraming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddSessionKey => "add session key",
            Self::Init => "init",
        }
    }
}

/// Control bytes that distinguish the relay framings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayControl {
    pub add_session_key: u8,
    pub init: u8,
}

impl Default for RelayControl {
    fn default() -> Self {
        // Current firmware receives 0x55 for both.
        Self {
            add_session_key: 85,
            init: 85,
        }
    }
}

impl RelayControl {
    pub fn byte_for(&self, framing: RelayFraming) -> u8 {
        match framing {
            RelayFraming::AddSessionKey => self.add_session_key,
            RelayFraming::Init => self.init,
        }
    }
}

pub fn get_device_info() -> Vec<u8> {
    vec![0, 1, family::PROVISION, 0]
}

pub fn request_csr() -> Vec<u8> {
    vec![0, 1, family::PROVISION, 1]
}

pub fn forward_certificate(certificate: &str) -> Vec<u8> {
    let mut cmd = vec![0, 1, family::PROVISION, 2];
    cmd.extend_from_slice(&RESERVED);
    cmd.extend_from_slice(certificate.as_bytes());
    cmd
}

pub fn forward_key(kind: KeyKind, pem: &str) -> Vec<u8> {
    let mut cmd = vec![0, 1, family::PROVISION, 3];
    cmd.extend_from_slice(&RESERVED);
    cmd.push(kind as u8);
    cmd.extend_from_slice(pem.as_bytes());
    cmd
}

pub fn set_rtc(packed: u32) -> Vec<u8> {
    let mut cmd = vec![0, 1, family::SELF_TEST, 0, 0];
    cmd.extend_from_slice(&packed.to_be_bytes());
    cmd
}

pub fn self_test(test: SelfTest) -> Vec<u8> {
    vec![0, 1, family::SELF_TEST, test as u8, 0]
}

/// Wrap a hex-encoded BLE command for the relay opcode.
pub fn ble_relay(framing: RelayFraming, control: &RelayControl, ble_hex: &str) -> Result<Vec<u8>, ProtocolError> {
    let ble = hex::decode(ble_hex)?;
    let mut cmd = vec![0, 1, family::BLE_RELAY, control.byte_for(framing)];
    cmd.extend_from_slice(&RESERVED);
    cmd.extend_from_slice(&ble);
    Ok(cmd)
}

/// Identity reported by "get device info".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub lock_mac: String,
    pub imei: String,
}

/// Modem details reported by "get device info 2".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo2 {
    pub iccid: String,
    pub battery: u8,
}

fn field<'a>(frame: &'a [u8], name: &'static str, offset: usize, len: usize) -> Result<&'a [u8], ProtocolError> {
    let end = offset + len;
    frame.get(offset..end).ok_or(ProtocolError::FieldOutOfRange {
        field: name,
        offset,
        end,
        len: frame.len(),
    })
}

fn ascii_digits(name: &'static str, bytes: &[u8]) -> Result<String, ProtocolError> {
    bytes
        .iter()
        .map(|&byte| {
            if byte.is_ascii_digit() {
                Ok((byte - b'0').to_string())
            } else {
                Err(ProtocolError::InvalidDigit { field: name, byte })
            }
        })
        .collect()
}

/// Format six bytes as `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn parse_device_info(frame: &[u8]) -> Result<DeviceInfo, ProtocolError> {
    let mac = field(frame, "MAC", offsets::MAC, offsets::MAC_LEN)?;
    let imei = field(frame, "IMEI", offsets::IMEI, offsets::IMEI_LEN)?;
    Ok(DeviceInfo {
        lock_mac: format_mac(mac),
        imei: ascii_digits("IMEI", imei)?,
    })
}

/// Extract the PEM certificate request, end marker included.
pub fn parse_csr(frame: &[u8]) -> Result<String, ProtocolError> {
    let body = field(frame, "CSR", offsets::FIELD_START, 0).map(|_| &frame[offsets::FIELD_START..])?;
    let text = String::from_utf8_lossy(body);
    let marker_at = text.find(CSR_END_MARKER).ok_or(ProtocolError::MissingCsrMarker)?;

    let mut end = marker_at + CSR_END_MARKER.len();
    if text[end..].starts_with('\n') {
        end += 1;
    }
    Ok(text[..end].to_string())
}

pub fn parse_device_info2(frame: &[u8]) -> Result<DeviceInfo2, ProtocolError> {
    let iccid = field(frame, "ICCID", offsets::ICCID, offsets::ICCID_LEN)?;
    let battery = field(frame, "battery", offsets::BATTERY, 1)?[0];
    Ok(DeviceInfo2 {
        iccid: ascii_digits("ICCID", iccid)?,
        battery,
    })
}

/// Decode the fob id as a zero-padded 10-digit decimal.
pub fn parse_fob_id(frame: &[u8], order: FobByteOrder) -> Result<String, ProtocolError> {
    let raw = field(frame, "fob id", offsets::FOB_ID, offsets::FOB_ID_LEN)?;
    let bytes = [raw[0], raw[1], raw[2], raw[3]];
    let id = match order {
        FobByteOrder::Little => u32::from_le_bytes(bytes),
        FobByteOrder::Big => u32::from_be_bytes(bytes),
    };
    Ok(format!("{:010}", id))
}

/// Extract the tunneled BLE response as lowercase hex.
pub fn parse_relay_response(frame: &[u8]) -> Result<String, ProtocolError> {
    let inner_len = field(frame, "relay length", offsets::RELAY_LENGTH, 1)?[0] as usize;
    let inner = field(
        frame,
        "relay payload",
        offsets::RELAY_PAYLOAD,
        inner_len + offsets::RELAY_TRAILER,
    )?;
    Ok(hex::encode(inner))
}

/// The four hex characters at offset 6..10 that classify BLE messages.
pub fn ble_marker(hex: &str) -> Option<&str> {
    hex.get(6..10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(fields: &[(usize, &[u8])]) -> Vec<u8> {
        let mut frame = vec![0u8; 64];
        frame[..4].copy_from_slice(&[0x5A, 0x5A, 0x00, 0x3E]);
        for (offset, bytes) in fields {
            frame[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        frame
    }

    #[test]
    fn test_device_info() {
        let frame = response(&[
            (17, &[0xEF, 0x4A, 0xF9, 0x38, 0xA9, 0x3E]),
            (23, b"864475040123456"),
        ]);
        let info = parse_device_info(&frame).unwrap();
        assert_eq!(info.lock_mac, "EF:4A:F9:38:A9:3E");
        assert_eq!(info.imei, "864475040123456");
    }

    #[test]
    fn test_imei_rejects_non_digits() {
        let frame = response(&[(23, b"86447504012345X")]);
        assert!(matches!(
            parse_device_info(&frame),
            Err(ProtocolError::InvalidDigit { field: "IMEI", byte: b'X' })
        ));
    }

    #[test]
    fn test_short_frame_fields() {
        let frame = vec![0x5A, 0x5A, 0x00, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            parse_device_info(&frame),
            Err(ProtocolError::FieldOutOfRange { field: "MAC", .. })
        ));
    }

    #[test]
    fn test_csr_extraction() {
        let pem = "-----BEGIN CERTIFICATE REQUEST-----\nMIIB\n-----END CERTIFICATE REQUEST-----\n";
        let mut frame = vec![0u8; 17];
        frame.extend_from_slice(pem.as_bytes());
        frame.extend_from_slice(&[0u8; 20]);

        assert_eq!(parse_csr(&frame).unwrap(), pem);

        let missing = response(&[(17, b"garbage")]);
        assert!(matches!(parse_csr(&missing), Err(ProtocolError::MissingCsrMarker)));
    }

    #[test]
    fn test_device_info2() {
        let frame = response(&[(39, b"898600MFSSYYGXX"), (54, &[87])]);
        assert!(parse_device_info2(&frame).is_err());

        let frame = response(&[(39, b"898604101920123"), (54, &[87])]);
        let info = parse_device_info2(&frame).unwrap();
        assert_eq!(info.iccid, "898604101920123");
        assert_eq!(info.battery, 87);
    }

    #[test]
    fn test_fob_id_byte_order() {
        let frame = response(&[(17, &[0x78, 0x56, 0x34, 0x12])]);
        assert_eq!(parse_fob_id(&frame, FobByteOrder::Little).unwrap(), "0305419896");
        assert_eq!(parse_fob_id(&frame, FobByteOrder::Big).unwrap(), "2018915346");
    }

    #[test]
    fn test_relay_response() {
        // Inner length byte (offset 19) = 2, so 5 bytes are returned.
        let frame = response(&[(17, &[0xAA, 0x55, 0x02, 0x00, 0x01, 0xFF])]);
        let hex = parse_relay_response(&frame).unwrap();
        assert_eq!(hex, "aa55020001");
        assert_eq!(ble_marker(&hex), Some("0001"));
    }

    #[test]
    fn test_relay_response_overrun() {
        let frame = response(&[(19, &[0xF0])]);
        assert!(matches!(
            parse_relay_response(&frame),
            Err(ProtocolError::FieldOutOfRange { field: "relay payload", .. })
        ));
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(get_device_info(), vec![0, 1, 64, 0]);
        assert_eq!(request_csr(), vec![0, 1, 64, 1]);
        assert_eq!(self_test(SelfTest::NfcFob), vec![0, 1, 65, 4, 0]);
        assert_eq!(set_rtc(0x0102_0304), vec![0, 1, 65, 0, 0, 1, 2, 3, 4]);

        let cert = forward_certificate("AB");
        assert_eq!(&cert[..4], &[0, 1, 64, 2]);
        assert_eq!(&cert[12..], b"AB");

        let key = forward_key(KeyKind::DeviceCa, "K");
        assert_eq!(&key[..4], &[0, 1, 64, 3]);
        assert_eq!(key[12], 2);
        assert_eq!(&key[13..], b"K");
    }

    #[test]
    fn test_relay_framing_control_byte() {
        let control = RelayControl {
            add_session_key: 0x55,
            init: 0x56,
        };
        let add = ble_relay(RelayFraming::AddSessionKey, &control, "a1b2").unwrap();
        let init = ble_relay(RelayFraming::Init, &control, "a1b2").unwrap();
        assert_eq!(&add[..4], &[0, 1, 170, 0x55]);
        assert_eq!(&init[..4], &[0, 1, 170, 0x56]);
        assert_eq!(&init[12..], &[0xA1, 0xB2]);

        assert!(ble_relay(RelayFraming::Init, &control, "zz").is_err());
    }
}
