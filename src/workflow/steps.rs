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

//! Named provisioning steps.

use std::fmt;

use crate::link::RelayFraming;

/// A provisioning step, labelled the way the operator sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateRecord,
    GetDeviceInfo,
    RequestDeviceToken,
    RequestCsr,
    UploadCsr,
    SendCertificate,
    SendDevicePrivateKey,
    SendDeviceCa,
    SendRootCa,
    SetRtc,
    TestHallSensor,
    TestContactSensor,
    TestTouchKey,
    TestNfcFob,
    GetDeviceInfo2,
    AwaitDeviceToken,
    Initialization,
    /// One tunneled BLE exchange inside initialization.
    RelayCommand(RelayFraming),
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::CreateRecord => "Create device record",
            Step::GetDeviceInfo => "Get device info",
            Step::RequestDeviceToken => "Request device token",
            Step::RequestCsr => "Request CSR",
            Step::UploadCsr => "Upload CSR",
            Step::SendCertificate => "Send certificate",
            Step::SendDevicePrivateKey => "Send device private key",
            Step::SendDeviceCa => "Send device CA",
            Step::SendRootCa => "Send root CA",
            Step::SetRtc => "Set RTC",
            Step::TestHallSensor => "Test hall sensor",
            Step::TestContactSensor => "Test contact sensor",
            Step::TestTouchKey => "Test touch key",
            Step::TestNfcFob => "Test NFC fob",
            Step::GetDeviceInfo2 => "Get device info 2",
            Step::AwaitDeviceToken => "Await device token",
            Step::Initialization => "Initialization",
            Step::RelayCommand(framing) => return write!(f, "Send {} command", framing.as_str()),
            Step::Done => "Done",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Step::UploadCsr.to_string(), "Upload CSR");
        assert_eq!(Step::GetDeviceInfo2.to_string(), "Get device info 2");
        assert_eq!(
            Step::RelayCommand(RelayFraming::AddSessionKey).to_string(),
            "Send add session key command"
        );
        assert_eq!(Step::RelayCommand(RelayFraming::Init).to_string(), "Send init command");
    }
}
