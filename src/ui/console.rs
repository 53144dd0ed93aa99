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

//! Line-based operator console on stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Actions the operator can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Login,
    Start,
    Cancel,
    ShowDevices,
    Status,
    Quit,
}

impl OperatorAction {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "login" | "l" => Some(Self::Login),
            "start" | "s" => Some(Self::Start),
            "cancel" | "c" => Some(Self::Cancel),
            "devices" | "d" => Some(Self::ShowDevices),
            "status" => Some(Self::Status),
            "quit" | "q" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub const HELP: &str = "commands: login, start, cancel, devices, status, quit";

/// Read operator actions from stdin until it closes.
pub fn run_console() -> mpsc::UnboundedReceiver<OperatorAction> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match OperatorAction::parse(&line) {
                    Some(action) => {
                        if action_tx.send(action).is_err() {
                            break;
                        }
                    }
                    None => info!("Unknown command '{}'; {}", line.trim(), HELP),
                },
                Ok(None) => {
                    let _ = action_tx.send(OperatorAction::Quit);
                    break;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });

    info!("Console ready; {}", HELP);
    action_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(OperatorAction::parse("start"), Some(OperatorAction::Start));
        assert_eq!(OperatorAction::parse("  LOGIN \n"), Some(OperatorAction::Login));
        assert_eq!(OperatorAction::parse("q"), Some(OperatorAction::Quit));
        assert_eq!(OperatorAction::parse("flash"), None);
    }
}
