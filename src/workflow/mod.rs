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

//! Lock provisioning workflow.
//!
//! A run is a fixed sequence of steps over one attached lock. Every step
//! reports `pending` and `success` (or `failed`), and the device record is
//! persisted at each of those boundaries. The first failure ends the run.

pub mod context;
pub mod relay;
pub mod rtc;
pub mod steps;

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cloud::{CloudSession, CommandApi, ProvisioningApi};
use crate::config::{Config, RelayConfig};
use crate::error::{CloudApiError, TransportError, WorkflowAbortedError, WorkflowError};
use crate::events::{LoginState, StatusEvent, StatusReporter, StepState};
use crate::link::commands::{self, KeyKind, SelfTest};
use crate::link::{FobByteOrder, FrameCodec, LinkTransport};
use crate::state::{AppState, RunGuard};
use crate::storage::{DeviceRecord, DeviceStore};

pub use context::{CancelHandle, RunContext};
pub use relay::{BleRelay, RelaySession};
pub use steps::Step;

/// Final status of a fully provisioned lock.
pub const STATUS_DONE: &str = "Done";

/// Per-run settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub exchange_timeout: Duration,
    pub request_timeout: Duration,
    pub fob_byte_order: FobByteOrder,
    pub rtc_utc_offset_minutes: Option<i32>,
    pub relay: RelayConfig,
}

impl WorkflowOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exchange_timeout: config.link.exchange_timeout(),
            request_timeout: config.cloud.request_timeout(),
            fob_byte_order: config.workflow.fob_byte_order,
            rtc_utc_offset_minutes: config.workflow.rtc_utc_offset_minutes,
            relay: config.relay.clone(),
        }
    }
}

type TokenTask = JoinHandle<Result<String, WorkflowError>>;

/// Tracks the current step and keeps the record in sync with it.
struct Progress<'a> {
    store: &'a dyn DeviceStore,
    reporter: &'a StatusReporter,
    record: DeviceRecord,
    current: Step,
}

impl Progress<'_> {
    async fn begin(&mut self, step: Step) -> Result<(), WorkflowError> {
        self.current = step;
        self.report(StepState::Pending, None).await
    }

    async fn succeed(&mut self, payload: Option<Value>) -> Result<(), WorkflowError> {
        self.report(StepState::Success, payload).await
    }

    async fn report(&mut self, state: StepState, payload: Option<Value>) -> Result<(), WorkflowError> {
        info!("{}: {}", self.current, state.as_str());
        self.persist(format!("{}: {}", self.current, state.as_str()))?;
        self.emit(state, payload).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), WorkflowError> {
        self.current = Step::Done;
        self.persist(STATUS_DONE.to_string())?;
        self.emit(StepState::Success, None).await;
        Ok(())
    }

    async fn fail(&mut self, err: &WorkflowError) {
        let message = err.to_string();
        error!("{} failed: {}", self.current, message);

        if let Err(e) = self.persist(format!("{}: failed: {}", self.current, message)) {
            warn!("Could not persist failure of record #{}: {}", self.record.id, e);
        }
        self.emit(StepState::Failed, Some(json!({ "message": message })))
            .await;
    }

    fn persist(&mut self, status: String) -> Result<(), WorkflowError> {
        self.record.provisioning_status = Some(status);
        self.store.update(&self.record)?;
        Ok(())
    }

    async fn emit(&self, state: StepState, payload: Option<Value>) {
        self.reporter
            .emit(StatusEvent::Step {
                step: self.current.to_string(),
                state,
                payload,
            })
            .await;
        self.reporter.emit(StatusEvent::device(&self.record)).await;
    }
}

/// Drives one lock from "just plugged in" to "provisioned".
pub struct ProvisioningWorkflow {
    transport: Arc<LinkTransport>,
    codec: FrameCodec,
    provisioning: Arc<dyn ProvisioningApi>,
    commands: Arc<dyn CommandApi>,
    store: Arc<dyn DeviceStore>,
    reporter: StatusReporter,
    state: Arc<AppState>,
    options: WorkflowOptions,
}

impl ProvisioningWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<LinkTransport>,
        codec: FrameCodec,
        provisioning: Arc<dyn ProvisioningApi>,
        commands: Arc<dyn CommandApi>,
        store: Arc<dyn DeviceStore>,
        reporter: StatusReporter,
        state: Arc<AppState>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            transport,
            codec,
            provisioning,
            commands,
            store,
            reporter,
            state,
            options,
        }
    }

    /// Log in to the cloud and open a session for subsequent runs.
    pub async fn login(&self) -> Result<CloudSession, CloudApiError> {
        self.reporter
            .emit(StatusEvent::Login {
                state: LoginState::Pending,
            })
            .await;

        let result = self.provisioning.login().await;

        let state = match &result {
            Ok(_) => LoginState::Success,
            Err(e) => {
                warn!("Login failed: {}", e);
                LoginState::Failed
            }
        };
        self.reporter.emit(StatusEvent::Login { state }).await;

        result.map(CloudSession::new)
    }

    /// Send the whole device list to the front end.
    pub async fn report_devices(&self) -> anyhow::Result<()> {
        let records = self.store.list()?;
        self.reporter.emit(StatusEvent::Devices { records }).await;
        Ok(())
    }

    /// Claim the workflow. Fails if no lock is attached or a run is
    /// already in progress.
    pub fn begin(&self) -> Result<RunGuard, WorkflowError> {
        if !self.transport.is_open() {
            return Err(TransportError::NoDevice.into());
        }
        self.state.begin_run()
    }

    /// Provision the attached lock.
    ///
    /// The guard from [`begin`](Self::begin) is held until the run ends.
    pub async fn run(
        &self,
        _guard: RunGuard,
        session: CloudSession,
        cancel: &CancelHandle,
    ) -> Result<DeviceRecord, WorkflowAbortedError> {
        let ctx = RunContext::new(
            Arc::clone(&self.transport),
            self.codec,
            cancel,
            self.options.exchange_timeout,
            self.options.request_timeout,
        );

        let record = self
            .store
            .create()
            .map_err(|e| WorkflowAbortedError::new(Step::CreateRecord, e.into()))?;
        info!("Provisioning started for record #{}", record.id);
        self.reporter.emit(StatusEvent::device(&record)).await;

        let mut progress = Progress {
            store: self.store.as_ref(),
            reporter: &self.reporter,
            record,
            current: Step::CreateRecord,
        };
        let mut session = session;
        let mut token_task: Option<TokenTask> = None;

        let result = self
            .run_steps(&ctx, &mut progress, &mut session, &mut token_task)
            .await;

        if let Some(task) = token_task {
            task.abort();
        }

        match result {
            Ok(()) => {
                info!("Record #{} provisioned", progress.record.id);
                Ok(progress.record)
            }
            Err(err) => {
                progress.fail(&err).await;
                Err(WorkflowAbortedError::new(progress.current, err))
            }
        }
    }

    async fn run_steps(
        &self,
        ctx: &RunContext,
        progress: &mut Progress<'_>,
        session: &mut CloudSession,
        token_task: &mut Option<TokenTask>,
    ) -> Result<(), WorkflowError> {
        progress.begin(Step::CreateRecord).await?;
        progress.succeed(None).await?;

        progress.begin(Step::GetDeviceInfo).await?;
        let frame = ctx.exchange(&commands::get_device_info()).await?;
        let info = commands::parse_device_info(&frame)?;
        progress.record.lock_mac = Some(info.lock_mac.clone());
        progress.record.imei = Some(info.imei.clone());
        progress
            .succeed(Some(json!({ "lockMac": info.lock_mac, "imei": info.imei })))
            .await?;

        progress.begin(Step::RequestDeviceToken).await?;
        *token_task = Some(self.spawn_device_token(ctx, session, &info.lock_mac));
        progress.succeed(None).await?;

        progress.begin(Step::RequestCsr).await?;
        let frame = ctx.exchange(&commands::request_csr()).await?;
        let csr = commands::parse_csr(&frame)?;
        progress.succeed(None).await?;

        progress.begin(Step::UploadCsr).await?;
        let bundle = ctx
            .cloud(
                "upload CSR",
                self.provisioning
                    .upload_csr(session, &info.lock_mac, &info.imei, &csr),
            )
            .await?;
        progress.succeed(None).await?;

        let installs = [
            (
                Step::SendCertificate,
                commands::forward_certificate(&bundle.certificate),
            ),
            (
                Step::SendDevicePrivateKey,
                commands::forward_key(KeyKind::DevicePrivateKey, &bundle.device_private_key),
            ),
            (
                Step::SendDeviceCa,
                commands::forward_key(KeyKind::DeviceCa, &bundle.device_ca),
            ),
            (
                Step::SendRootCa,
                commands::forward_key(KeyKind::RootCa, &bundle.root_ca),
            ),
        ];
        for (step, command) in installs {
            progress.begin(step).await?;
            ctx.exchange(&command).await?;
            progress.succeed(None).await?;
        }

        progress.begin(Step::SetRtc).await?;
        let now = rtc::station_time(self.options.rtc_utc_offset_minutes);
        ctx.exchange(&commands::set_rtc(rtc::pack(&now)?)).await?;
        progress
            .succeed(Some(json!({ "time": now.to_rfc3339() })))
            .await?;

        for (step, test) in [
            (Step::TestHallSensor, SelfTest::HallSensor),
            (Step::TestContactSensor, SelfTest::ContactSensor),
            (Step::TestTouchKey, SelfTest::TouchKey),
        ] {
            progress.begin(step).await?;
            ctx.exchange(&commands::self_test(test)).await?;
            progress.succeed(None).await?;
        }

        progress.begin(Step::TestNfcFob).await?;
        let frame = ctx.exchange(&commands::self_test(SelfTest::NfcFob)).await?;
        let fob_id = commands::parse_fob_id(&frame, self.options.fob_byte_order)?;
        progress.succeed(Some(json!({ "fobId": fob_id }))).await?;

        progress.begin(Step::GetDeviceInfo2).await?;
        let frame = ctx
            .exchange(&commands::self_test(SelfTest::DeviceInfo2))
            .await?;
        let info2 = commands::parse_device_info2(&frame)?;
        progress
            .succeed(Some(json!({ "iccid": info2.iccid, "battery": info2.battery })))
            .await?;

        progress.begin(Step::AwaitDeviceToken).await?;
        let task = token_task
            .as_mut()
            .ok_or_else(|| WorkflowError::TokenTask("token request was never started".to_string()))?;
        let token = ctx
            .cancellable(task)
            .await?
            .map_err(|e| WorkflowError::TokenTask(e.to_string()))??;
        *token_task = None;
        session.device_token = Some(token);
        progress.succeed(None).await?;

        progress.begin(Step::Initialization).await?;
        let relay = BleRelay::new(
            ctx,
            self.commands.as_ref(),
            &self.reporter,
            self.options.relay.control(),
        );
        relay
            .init(session, &self.options.relay, &info.lock_mac, Some(info2.battery))
            .await?;
        progress.succeed(None).await?;

        progress.finish().await
    }

    /// Request the device token in the background; awaited before initialization.
    fn spawn_device_token(&self, ctx: &RunContext, session: &CloudSession, lock_mac: &str) -> TokenTask {
        let provisioning = Arc::clone(&self.provisioning);
        let session = session.clone();
        let lock_mac = lock_mac.to_string();
        let timeout = ctx.request_timeout();

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, provisioning.get_device_token(&session, &lock_mac)).await {
                Ok(result) => result.map_err(WorkflowError::from),
                Err(_) => Err(WorkflowError::Timeout {
                    operation: "get device token",
                    timeout,
                }),
            }
        })
    }
}
