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

//! Lock provisioning station

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lock_provisioner::cloud::{CloudSession, CommandApi, ProvisioningApi, RestCloudClient};
use lock_provisioner::config::Config;
use lock_provisioner::error::CloudApiError;
use lock_provisioner::events::{EventProcessor, StatusReporter};
use lock_provisioner::link::{FrameCodec, HidProbe, LinkTransport};
use lock_provisioner::state::AppState;
use lock_provisioner::storage::{DeviceStore, SqliteDeviceStore};
use lock_provisioner::ui::{self, OperatorAction};
use lock_provisioner::workflow::{CancelHandle, ProvisioningWorkflow, WorkflowOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lock_provisioner=info".parse::<Directive>()?),
        )
        .init();

    info!("Starting lock provisioner v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize storage
    let store: Arc<dyn DeviceStore> = Arc::new(SqliteDeviceStore::new(&config.data_dir)?);
    info!("Device storage initialized");

    let state = AppState::new();
    let (reporter, mut event_rx) = StatusReporter::channel(64);

    // Mirror status events into state and the log
    let mut processor = EventProcessor::new(state.clone());
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            processor.process_event(&event);
        }
    });

    // Watch for the lock on the wired link
    let probe = Arc::new(HidProbe::new(config.link.vendor_id, config.link.product_id)?);
    let transport = Arc::new(LinkTransport::new(probe, config.link.read_poll()));
    transport.spawn_presence_monitor(config.link.presence_poll(), reporter.clone());

    let cloud = Arc::new(RestCloudClient::new(&config.cloud)?);
    let provisioning: Arc<dyn ProvisioningApi> = cloud.clone();
    let commands: Arc<dyn CommandApi> = cloud;

    let workflow = Arc::new(ProvisioningWorkflow::new(
        transport,
        FrameCodec::new(config.link.block_sizing, config.link.strict_checksum),
        provisioning,
        commands,
        store,
        reporter,
        state.clone(),
        WorkflowOptions::from_config(&config),
    ));

    if let Err(e) = workflow.report_devices().await {
        error!("Could not list devices: {}", e);
    }

    let mut action_rx = ui::run_console();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<CloudSession>();
    let mut session: Option<CloudSession> = None;
    let mut cancel: Option<CancelHandle> = None;

    info!("Ready.");

    // Handle operator actions
    loop {
        tokio::select! {
            Some(action) = action_rx.recv() => {
                match action {
                    OperatorAction::Login => {
                        let workflow = workflow.clone();
                        let session_tx = session_tx.clone();
                        tokio::spawn(async move {
                            if let Ok(session) = workflow.login().await {
                                let _ = session_tx.send(session);
                            }
                        });
                    }
                    OperatorAction::Start => {
                        let Some(current) = session.clone() else {
                            warn!("{}", CloudApiError::NotLoggedIn);
                            continue;
                        };
                        if !state.is_link_connected() {
                            warn!("Lock not connected");
                            continue;
                        }
                        let guard = match workflow.begin() {
                            Ok(guard) => guard,
                            Err(e) => {
                                warn!("{}", e);
                                continue;
                            }
                        };

                        let handle = CancelHandle::new();
                        cancel = Some(handle.clone());
                        let workflow = workflow.clone();
                        tokio::spawn(async move {
                            match workflow.run(guard, current, &handle).await {
                                Ok(record) => info!(
                                    "Lock {} provisioned",
                                    record.lock_mac.as_deref().unwrap_or("-")
                                ),
                                Err(e) => error!("Provisioning aborted: {}", e),
                            }
                        });
                    }
                    OperatorAction::Cancel => match &cancel {
                        Some(handle) if !handle.is_cancelled() => {
                            info!("Cancelling provisioning run");
                            handle.cancel();
                        }
                        _ => info!("Nothing to cancel"),
                    },
                    OperatorAction::ShowDevices => {
                        if let Err(e) = workflow.report_devices().await {
                            error!("Could not list devices: {}", e);
                        }
                    }
                    OperatorAction::Status => {
                        info!(
                            "link={} logged_in={} workflow={}",
                            if state.is_link_connected() { "connected" } else { "disconnected" },
                            state.is_logged_in(),
                            state.workflow_status().as_str()
                        );
                    }
                    OperatorAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            Some(new_session) = session_rx.recv() => {
                session = Some(new_session);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Some(handle) = cancel {
        handle.cancel();
    }
    info!("Lock provisioner stopped");
    Ok(())
}
