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

//! Application state management.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::events::LoginState;

/// Whether a provisioning run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Idle,
    Running,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
        }
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Whether the lock is attached.
    pub link_connected: RwLock<bool>,

    /// Cloud login progress.
    pub login_state: RwLock<LoginState>,

    /// Reentrancy flag for the provisioning workflow.
    pub workflow: RwLock<WorkflowStatus>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            link_connected: RwLock::new(false),
            login_state: RwLock::new(LoginState::Failed),
            workflow: RwLock::new(WorkflowStatus::Idle),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_link_connected(&self, connected: bool) {
        *self.link_connected.write() = connected;
    }

    pub fn is_link_connected(&self) -> bool {
        *self.link_connected.read()
    }

    pub fn set_login_state(&self, state: LoginState) {
        *self.login_state.write() = state;
    }

    pub fn is_logged_in(&self) -> bool {
        *self.login_state.read() == LoginState::Success
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        *self.workflow.read()
    }

    /// Move `idle -> running`. The run ends when the guard drops.
    pub fn begin_run(self: &Arc<Self>) -> Result<RunGuard, WorkflowError> {
        let mut status = self.workflow.write();
        if *status == WorkflowStatus::Running {
            return Err(WorkflowError::AlreadyRunning);
        }
        *status = WorkflowStatus::Running;
        Ok(RunGuard {
            state: Arc::clone(self),
        })
    }
}

/// Holds the workflow in `running` until dropped.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<AppState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.state.workflow.write() = WorkflowStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_run_rejected() {
        let state = AppState::new();

        let guard = state.begin_run().unwrap();
        assert_eq!(state.workflow_status(), WorkflowStatus::Running);
        assert!(matches!(state.begin_run(), Err(WorkflowError::AlreadyRunning)));

        drop(guard);
        assert_eq!(state.workflow_status(), WorkflowStatus::Idle);
        assert!(state.begin_run().is_ok());
    }

    #[test]
    fn test_defaults() {
        let state = AppState::new();
        assert!(!state.is_link_connected());
        assert!(!state.is_logged_in());
        assert_eq!(state.workflow_status().as_str(), "idle");
    }
}
