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

//! Error types for the provisioning engine.

use std::time::Duration;
use thiserror::Error;

use crate::workflow::Step;

/// Failures talking to the wired link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No lock is currently attached.
    #[error("no device connected")]
    NoDevice,

    #[error("link I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HID error: {0}")]
    Hid(String),
}

/// Malformed frames or response fields.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot encode an empty command")]
    EmptyCommand,

    /// Legacy block sizing left no room for header and checksum.
    #[error("command of {len} bytes overflows its last block ({capacity} bytes available)")]
    BlockOverflow { len: usize, capacity: usize },

    #[error("frame of {len} bytes exceeds the 16-bit length header")]
    FrameTooLarge { len: usize },

    #[error("frame does not start with the sync marker")]
    BadSync,

    #[error("frame truncated: declared {declared} bytes, buffered {buffered}")]
    Truncated { declared: usize, buffered: usize },

    #[error("checksum mismatch: frame carries {actual:#06x}, computed {expected:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("{field} at offset {offset}..{end} lies outside a {len}-byte frame")]
    FieldOutOfRange {
        field: &'static str,
        offset: usize,
        end: usize,
        len: usize,
    },

    #[error("{field} contains non-digit byte {byte:#04x}")]
    InvalidDigit { field: &'static str, byte: u8 },

    #[error("CSR response has no end-of-request marker")]
    MissingCsrMarker,

    #[error("invalid hex command: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("year {0} cannot be packed into the RTC layout")]
    RtcOutOfRange(i32),
}

/// Failures reported by (or while reaching) the cloud services.
#[derive(Debug, Error)]
pub enum CloudApiError {
    /// The service answered with `success == false`.
    #[error("cloud rejected request: {0}")]
    Rejected(String),

    #[error("cloud reply carries no command")]
    MissingCommand,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected cloud response: {0}")]
    Decode(String),
}

/// Any failure inside a single workflow step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Cloud(#[from] CloudApiError),

    #[error("device store: {0}")]
    Store(#[from] anyhow::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("provisioning cancelled")]
    Cancelled,

    #[error("a provisioning run is already in progress")]
    AlreadyRunning,

    #[error("device token task failed: {0}")]
    TokenTask(String),
}

/// A workflow run that stopped at `step`.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct WorkflowAbortedError {
    pub step: Step,
    #[source]
    pub source: WorkflowError,
}

impl WorkflowAbortedError {
    pub fn new(step: Step, source: WorkflowError) -> Self {
        Self { step, source }
    }
}
