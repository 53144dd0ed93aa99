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

//! BLE handshake brokered between the command service and the lock.
//!
//! Phase A asks the service for commands and tunnels each one to the lock
//! until the lock answers with the "session ready" marker. Phase B forwards
//! that answer back and keeps relaying whatever the service sends until it
//! stops sending commands.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::context::RunContext;
use super::steps::Step;
use crate::cloud::{device_id_from_mac, CloudSession, CommandApi, RelayParams, ServerReply};
use crate::config::RelayConfig;
use crate::error::{CloudApiError, WorkflowError};
use crate::events::{StatusEvent, StatusReporter, StepState};
use crate::link::commands::{self, ble_marker};
use crate::link::{RelayControl, RelayFraming};

/// Marker of commands that carry a session key.
const MARKER_ADD_SESSION_KEY: &str = "0000";

/// Marker of the lock response that ends phase A.
const MARKER_SESSION_READY: &str = "0001";

/// State of one relay handshake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelaySession {
    pub last_ble_response_hex: String,
    pub workflow_name: String,
    pub extra_params: RelayParams,
}

/// Build the parameters sent with the `init` workflow.
pub fn init_params(config: &RelayConfig, lock_mac: &str, battery: Option<u8>) -> RelayParams {
    let mut params = RelayParams::new();
    params.insert("lockMac".into(), json!(lock_mac));
    params.insert("lockType".into(), json!(config.lock_type));
    params.insert(
        "battery".into(),
        json!(battery.unwrap_or(config.default_battery)),
    );
    params.insert("modelNum".into(), json!(config.model_num));
    params.insert("hardwareVer".into(), json!(config.hardware_ver));
    params.insert("firmwareVer".into(), json!(config.firmware_ver));
    params.insert("V3LockDeviceId".into(), json!(device_id_from_mac(lock_mac)));
    params.insert("timezone".into(), json!(config.timezone));
    params
}

fn framing_for(command_hex: &str) -> RelayFraming {
    if ble_marker(command_hex) == Some(MARKER_ADD_SESSION_KEY) {
        RelayFraming::AddSessionKey
    } else {
        RelayFraming::Init
    }
}

/// The command carried by a successful reply, if any.
fn next_command(reply: ServerReply) -> Result<Option<String>, CloudApiError> {
    Ok(reply.into_result()?.command.filter(|c| !c.is_empty()))
}

pub struct BleRelay<'a> {
    ctx: &'a RunContext,
    commands: &'a dyn CommandApi,
    reporter: &'a StatusReporter,
    control: RelayControl,
}

impl<'a> BleRelay<'a> {
    pub fn new(
        ctx: &'a RunContext,
        commands: &'a dyn CommandApi,
        reporter: &'a StatusReporter,
        control: RelayControl,
    ) -> Self {
        Self {
            ctx,
            commands,
            reporter,
            control,
        }
    }

    /// Run the `init` handshake for a freshly provisioned lock.
    pub async fn init(
        &self,
        session: &CloudSession,
        config: &RelayConfig,
        lock_mac: &str,
        battery: Option<u8>,
    ) -> Result<RelaySession, WorkflowError> {
        let mut relay = RelaySession {
            last_ble_response_hex: String::new(),
            workflow_name: config.workflow.clone(),
            extra_params: init_params(config, lock_mac, battery),
        };
        self.run(session, lock_mac, &mut relay).await?;
        Ok(relay)
    }

    pub async fn run(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        relay: &mut RelaySession,
    ) -> Result<(), WorkflowError> {
        info!("Starting BLE relay for workflow '{}'", relay.workflow_name);

        loop {
            let reply = self
                .ctx
                .cloud(
                    "request server command",
                    self.commands.request_server_command(
                        session,
                        lock_mac,
                        &relay.workflow_name,
                        &relay.last_ble_response_hex,
                        &relay.extra_params,
                    ),
                )
                .await?;
            let command = next_command(reply)?.ok_or(CloudApiError::MissingCommand)?;

            relay.last_ble_response_hex = self.send(framing_for(&command), &command).await?;
            if ble_marker(&relay.last_ble_response_hex) == Some(MARKER_SESSION_READY) {
                break;
            }
        }

        debug!("Session ready, forwarding responses");
        let mut pending = self.forward(session, lock_mac, relay).await?;
        while let Some(command) = pending {
            relay.last_ble_response_hex = self.send(RelayFraming::Init, &command).await?;
            pending = self.forward(session, lock_mac, relay).await?;
        }

        info!("BLE relay for '{}' complete", relay.workflow_name);
        Ok(())
    }

    async fn forward(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        relay: &RelaySession,
    ) -> Result<Option<String>, WorkflowError> {
        let reply = self
            .ctx
            .cloud(
                "forward response",
                self.commands.forward_response_to_server(
                    session,
                    lock_mac,
                    &relay.last_ble_response_hex,
                    None,
                ),
            )
            .await?;
        Ok(next_command(reply)?)
    }

    /// Tunnel one BLE command and return the lock's BLE response as hex.
    async fn send(&self, framing: RelayFraming, command_hex: &str) -> Result<String, WorkflowError> {
        let step = Step::RelayCommand(framing).to_string();
        self.report(&step, StepState::Pending, None).await;

        let result = self.exchange(framing, command_hex).await;
        match &result {
            Ok(response) => {
                self.report(&step, StepState::Success, Some(json!({ "bleResponse": response })))
                    .await
            }
            // The run-level failure event carries the message.
            Err(_) => self.report(&step, StepState::Failed, None).await,
        }
        result
    }

    async fn exchange(&self, framing: RelayFraming, command_hex: &str) -> Result<String, WorkflowError> {
        let command = commands::ble_relay(framing, &self.control, command_hex)?;
        let frame = self.ctx.exchange(&command).await?;
        Ok(commands::parse_relay_response(&frame)?)
    }

    async fn report(&self, step: &str, state: StepState, payload: Option<Value>) {
        self.reporter
            .emit(StatusEvent::Step {
                step: step.to_string(),
                state,
                payload,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_params() {
        let params = init_params(&RelayConfig::default(), "EF:4A:F9:38:A9:3E", None);
        assert_eq!(params["lockMac"], "EF:4A:F9:38:A9:3E");
        assert_eq!(params["lockType"], "V3Lock");
        assert_eq!(params["battery"], 100);
        assert_eq!(params["modelNum"], 3);
        assert_eq!(params["V3LockDeviceId"], "F938A93E");
        assert_eq!(params["timezone"], "Pacific Time (US & Canada)");

        let measured = init_params(&RelayConfig::default(), "EF:4A:F9:38:A9:3E", Some(87));
        assert_eq!(measured["battery"], 87);
    }

    #[test]
    fn test_framing_from_marker() {
        assert_eq!(framing_for("aabbcc0000ff"), RelayFraming::AddSessionKey);
        assert_eq!(framing_for("aabbcc0002ff"), RelayFraming::Init);
        assert_eq!(framing_for("ab"), RelayFraming::Init);
    }

    #[test]
    fn test_empty_command_means_none() {
        let reply = ServerReply {
            success: true,
            command: Some(String::new()),
            message: None,
        };
        assert_eq!(next_command(reply).unwrap(), None);

        let rejected = ServerReply {
            success: false,
            command: Some("aa".to_string()),
            message: Some("nope".to_string()),
        };
        assert!(next_command(rejected).is_err());
    }
}
