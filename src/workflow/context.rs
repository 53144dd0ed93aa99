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

//! Timeouts and cancellation for one provisioning run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::error::{CloudApiError, WorkflowError};
use crate::link::{FrameCodec, LinkTransport};

/// Operator-side switch that cancels a run.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Wraps every suspension point of a run.
pub struct RunContext {
    transport: Arc<LinkTransport>,
    codec: FrameCodec,
    cancel: watch::Receiver<bool>,
    exchange_timeout: Duration,
    request_timeout: Duration,
}

impl RunContext {
    pub fn new(
        transport: Arc<LinkTransport>,
        codec: FrameCodec,
        cancel: &CancelHandle,
        exchange_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            codec,
            cancel: cancel.subscribe(),
            exchange_timeout,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Encode `command`, send it and return the decoded reply frame.
    pub async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, WorkflowError> {
        let frame = self.codec.encode(command)?;
        let reply = self
            .guarded(
                "device exchange",
                self.exchange_timeout,
                self.transport.exchange(&frame),
            )
            .await?;
        Ok(self.codec.decode(reply)?.into_bytes())
    }

    /// Run a cloud call under the request timeout.
    pub async fn cloud<T, F>(&self, operation: &'static str, call: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, CloudApiError>>,
    {
        self.guarded(operation, self.request_timeout, call).await
    }

    /// Await `fut` unless the run is cancelled first.
    pub async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, WorkflowError> {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(WorkflowError::Cancelled),
            output = fut => Ok(output),
        }
    }

    async fn guarded<T, E, F>(
        &self,
        operation: &'static str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<WorkflowError>,
    {
        match self.cancellable(tokio::time::timeout(timeout, fut)).await? {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!("{} timed out after {:?}", operation, timeout);
                Err(WorkflowError::Timeout { operation, timeout })
            }
        }
    }
}

/// Resolves once the flag is set. Never resolves if the handle is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::link::{LinkPort, LinkProbe};

    struct Absent;

    impl LinkProbe for Absent {
        fn is_present(&self) -> bool {
            false
        }

        fn open(&self) -> Result<Box<dyn LinkPort>, TransportError> {
            Err(TransportError::NoDevice)
        }
    }

    fn context(cancel: &CancelHandle) -> RunContext {
        let transport = Arc::new(LinkTransport::new(Arc::new(Absent), Duration::from_millis(5)));
        RunContext::new(
            transport,
            FrameCodec::default(),
            cancel,
            Duration::from_millis(50),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_cloud_call_times_out() {
        let cancel = CancelHandle::new();
        let ctx = context(&cancel);

        let result: Result<(), _> = ctx
            .cloud("slow call", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(WorkflowError::Timeout { operation: "slow call", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_pending_call() {
        let cancel = CancelHandle::new();
        let ctx = context(&cancel);
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let result = ctx.cancellable(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(WorkflowError::Cancelled)));
    }

    #[tokio::test]
    async fn test_exchange_without_device() {
        let cancel = CancelHandle::new();
        let ctx = context(&cancel);

        let result = ctx.exchange(&[0, 1, 64, 0]).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Transport(TransportError::NoDevice))
        ));
    }
}
