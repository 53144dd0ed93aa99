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

//! Status events for the operator front end.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::state::AppState;
use crate::storage::DeviceRecord;

/// State of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Success,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Cloud login progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginState {
    Failed,
    Pending,
    Success,
}

/// Everything the front end needs to render progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// A workflow step changed state.
    Step {
        step: String,
        state: StepState,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// A device record changed.
    Device {
        id: i64,
        lock_mac: Option<String>,
        imei: Option<String>,
        provisioning_status: Option<String>,
    },
    /// The lock was plugged in or removed.
    Link { connected: bool },
    Login { state: LoginState },
    /// Full device list, sent at startup and on request.
    Devices { records: Vec<DeviceRecord> },
}

impl StatusEvent {
    pub fn device(record: &DeviceRecord) -> Self {
        Self::Device {
            id: record.id,
            lock_mac: record.lock_mac.clone(),
            imei: record.imei.clone(),
            provisioning_status: record.provisioning_status.clone(),
        }
    }
}

/// Sending half of the status channel.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusReporter {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }

    /// Create a reporter and the receiver the front end drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Emit an event. A closed channel is not an error for the engine.
    pub async fn emit(&self, event: StatusEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Status channel closed, event dropped");
        }
    }
}

/// Headless front end: mirrors events into shared state and the log.
pub struct EventProcessor {
    state: std::sync::Arc<AppState>,
}

impl EventProcessor {
    pub fn new(state: std::sync::Arc<AppState>) -> Self {
        Self { state }
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::Step {
                step,
                state,
                payload,
            } => match (state, payload) {
                (StepState::Failed, Some(payload)) => error!("{}: failed {}", step, payload),
                (StepState::Failed, None) => error!("{}: failed", step),
                (_, Some(payload)) => info!("{}: {} {}", step, state.as_str(), payload),
                (_, None) => info!("{}: {}", step, state.as_str()),
            },
            StatusEvent::Device {
                id,
                lock_mac,
                imei,
                provisioning_status,
            } => {
                info!(
                    "Device #{} mac={} imei={} status={}",
                    id,
                    lock_mac.as_deref().unwrap_or("-"),
                    imei.as_deref().unwrap_or("-"),
                    provisioning_status.as_deref().unwrap_or("-")
                );
            }
            StatusEvent::Link { connected } => {
                self.state.set_link_connected(*connected);
                if *connected {
                    info!("USB connected");
                } else {
                    warn!("USB disconnected");
                }
            }
            StatusEvent::Login { state } => {
                self.state.set_login_state(*state);
                match state {
                    LoginState::Failed => warn!("Login failed"),
                    LoginState::Pending => info!("Logging in..."),
                    LoginState::Success => info!("Logged in"),
                }
            }
            StatusEvent::Devices { records } => {
                info!("{} device(s) on record", records.len());
                for record in records {
                    info!(
                        "  #{} {} {} {}",
                        record.id,
                        record.lock_mac.as_deref().unwrap_or("-"),
                        record.imei.as_deref().unwrap_or("-"),
                        record.provisioning_status.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
}
