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

//! HID backend for the wired link.

use hidapi::{HidApi, HidDevice, HidError};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use super::link_constants::BLOCK_SIZE;
use super::transport::{LinkPort, LinkProbe};
use crate::error::TransportError;

fn hid_error(e: HidError) -> TransportError {
    TransportError::Hid(e.to_string())
}

/// Enumerates HID devices looking for the lock's VID/PID.
pub struct HidProbe {
    api: Mutex<HidApi>,
    vendor_id: u16,
    product_id: u16,
}

impl HidProbe {
    pub fn new(vendor_id: u16, product_id: u16) -> Result<Self, TransportError> {
        let api = HidApi::new().map_err(hid_error)?;
        info!("HID backend ready, watching for {:04x}:{:04x}", vendor_id, product_id);
        Ok(Self {
            api: Mutex::new(api),
            vendor_id,
            product_id,
        })
    }
}

impl LinkProbe for HidProbe {
    fn is_present(&self) -> bool {
        let mut api = self.api.lock();
        if let Err(e) = api.refresh_devices() {
            warn!("HID enumeration failed: {}", e);
            return false;
        }
        let present = api
            .device_list()
            .any(|d| d.vendor_id() == self.vendor_id && d.product_id() == self.product_id);
        present
    }

    fn open(&self) -> Result<Box<dyn LinkPort>, TransportError> {
        let device = self
            .api
            .lock()
            .open(self.vendor_id, self.product_id)
            .map_err(hid_error)?;
        Ok(Box::new(HidPort { device }))
    }
}

/// An open HID connection to the lock.
pub struct HidPort {
    device: HidDevice,
}

impl LinkPort for HidPort {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        // Report id 0 precedes the data.
        let mut buf = Vec::with_capacity(report.len() + 1);
        buf.push(0);
        buf.extend_from_slice(report);
        self.device.write(&buf).map_err(hid_error)?;
        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = [0u8; BLOCK_SIZE];
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = self.device.read_timeout(&mut buf, millis).map_err(hid_error)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }
}
