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

//! Lock provisioning station.
//!
//! Talks to a smart lock over its wired HID link, obtains certificates from
//! the cloud, installs them, runs the hardware self-tests and brokers the
//! initial BLE handshake between the lock and the command service.

pub mod cloud;
pub mod config;
pub mod error;
pub mod events;
pub mod link;
pub mod state;
pub mod storage;
pub mod ui;
pub mod workflow;
