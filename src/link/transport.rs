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

//! Duplex report channel to the lock, with presence polling.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reassembler::{chunk_frame, FrameReassembler};
use crate::error::TransportError;
use crate::events::{StatusEvent, StatusReporter};

/// An open link to one device. Calls block.
pub trait LinkPort: Send {
    /// Write one report (at most one block).
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError>;

    /// Read one report, or `None` if nothing arrived within `timeout`.
    fn read_report(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Finds and opens the device.
pub trait LinkProbe: Send + Sync {
    fn is_present(&self) -> bool;

    fn open(&self) -> Result<Box<dyn LinkPort>, TransportError>;
}

type SharedPort = Arc<Mutex<Option<Box<dyn LinkPort>>>>;

/// Frame-level transport over the wired link.
pub struct LinkTransport {
    probe: Arc<dyn LinkProbe>,
    port: SharedPort,
    reassembler: Mutex<FrameReassembler>,
    exchange_lock: tokio::sync::Mutex<()>,
    read_poll: Duration,
}

impl LinkTransport {
    pub fn new(probe: Arc<dyn LinkProbe>, read_poll: Duration) -> Self {
        Self {
            probe,
            port: Arc::new(Mutex::new(None)),
            reassembler: Mutex::new(FrameReassembler::new()),
            exchange_lock: tokio::sync::Mutex::new(()),
            read_poll,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.lock().is_some()
    }

    /// Probe once. Returns the new presence state if it changed.
    pub fn poll_presence(&self) -> Option<bool> {
        let present = self.probe.is_present();
        let mut port = self.port.lock();

        match (present, port.is_some()) {
            (true, false) => match self.probe.open() {
                Ok(opened) => {
                    *port = Some(opened);
                    info!("Lock connected");
                    Some(true)
                }
                Err(e) => {
                    warn!("Lock present but could not be opened: {}", e);
                    None
                }
            },
            (false, true) => {
                *port = None;
                info!("Lock disconnected");
                Some(false)
            }
            _ => None,
        }
    }

    /// Poll device presence on a fixed interval, reporting transitions.
    pub fn spawn_presence_monitor(
        self: &Arc<Self>,
        interval: Duration,
        reporter: StatusReporter,
    ) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let polled = Arc::clone(&transport);
                match tokio::task::spawn_blocking(move || polled.poll_presence()).await {
                    Ok(Some(connected)) => reporter.emit(StatusEvent::Link { connected }).await,
                    Ok(None) => {}
                    Err(e) => warn!("Presence poll failed: {}", e),
                }
            }
        })
    }

    /// Write a frame block by block.
    pub async fn write(&self, frame: &[u8]) -> Result<(), TransportError> {
        for block in chunk_frame(frame) {
            debug!("Sent: {}", hex::encode(block));
            let port = Arc::clone(&self.port);
            let block = block.to_vec();
            run_blocking(move || {
                let mut guard = port.lock();
                let port = guard.as_mut().ok_or(TransportError::NoDevice)?;
                port.write_report(&block)
            })
            .await?;
        }
        Ok(())
    }

    /// Read reports until a whole frame is reassembled.
    ///
    /// Waits indefinitely; callers bound it with a timeout.
    pub async fn read(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            let port = Arc::clone(&self.port);
            let poll = self.read_poll;
            let chunk = run_blocking(move || {
                let mut guard = port.lock();
                let port = guard.as_mut().ok_or(TransportError::NoDevice)?;
                port.read_report(poll)
            })
            .await?;

            let Some(chunk) = chunk else {
                continue;
            };
            debug!("Received: {}", hex::encode(&chunk));

            if let Some(frame) = self.reassembler.lock().process_chunk(&chunk) {
                return Ok(frame);
            }
        }
    }

    /// Send a frame and wait for the device's reply.
    ///
    /// Exchanges are serialized; any partial frame left by an abandoned
    /// exchange is discarded first.
    pub async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let _exclusive = self.exchange_lock.lock().await;
        self.reassembler.lock().reset();
        self.write(frame).await?;
        self.read().await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, TransportError>
where
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::codec::FrameCodec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Echoes every written report back.
    struct LoopbackPort {
        pending: VecDeque<Vec<u8>>,
    }

    impl LinkPort for LoopbackPort {
        fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
            self.pending.push_back(report.to_vec());
            Ok(())
        }

        fn read_report(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.pending.pop_front())
        }
    }

    struct ToggleProbe {
        present: AtomicBool,
    }

    impl LinkProbe for ToggleProbe {
        fn is_present(&self) -> bool {
            self.present.load(Ordering::SeqCst)
        }

        fn open(&self) -> Result<Box<dyn LinkPort>, TransportError> {
            Ok(Box::new(LoopbackPort {
                pending: VecDeque::new(),
            }))
        }
    }

    fn transport(present: bool) -> (Arc<ToggleProbe>, LinkTransport) {
        let probe = Arc::new(ToggleProbe {
            present: AtomicBool::new(present),
        });
        let transport = LinkTransport::new(probe.clone(), Duration::from_millis(1));
        (probe, transport)
    }

    #[test]
    fn test_presence_transitions() {
        let (probe, transport) = transport(false);

        assert_eq!(transport.poll_presence(), None);
        probe.present.store(true, Ordering::SeqCst);
        assert_eq!(transport.poll_presence(), Some(true));
        assert_eq!(transport.poll_presence(), None);
        assert!(transport.is_open());

        probe.present.store(false, Ordering::SeqCst);
        assert_eq!(transport.poll_presence(), Some(false));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_exchange_without_device() {
        let (_probe, transport) = transport(false);
        let frame = FrameCodec::default().encode(&[0, 1, 64, 0]).unwrap();
        assert!(matches!(
            transport.exchange(&frame).await,
            Err(TransportError::NoDevice)
        ));
    }

    #[tokio::test]
    async fn test_multi_block_loopback() {
        let (_probe, transport) = transport(true);
        transport.poll_presence();

        let frame = FrameCodec::default().encode(&[0x42; 150]).unwrap();
        assert_eq!(frame.len(), 192);
        let echoed = transport.exchange(&frame).await.unwrap();
        assert_eq!(echoed, frame);
    }

    #[tokio::test]
    async fn test_presence_monitor_reports_connect() {
        let (_probe, transport) = transport(true);
        let transport = Arc::new(transport);
        let (reporter, mut events) = StatusReporter::channel(8);

        let monitor = transport.spawn_presence_monitor(Duration::from_millis(10), reporter);
        let event = events.recv().await.unwrap();
        monitor.abort();

        assert!(matches!(event, StatusEvent::Link { connected: true }));
        assert!(transport.is_open());
    }

    /// Enumeration that takes far longer than a poll interval.
    struct SlowEnumeration;

    impl LinkProbe for SlowEnumeration {
        fn is_present(&self) -> bool {
            std::thread::sleep(Duration::from_millis(300));
            false
        }

        fn open(&self) -> Result<Box<dyn LinkPort>, TransportError> {
            Err(TransportError::NoDevice)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_enumeration_does_not_stall_runtime() {
        let transport = Arc::new(LinkTransport::new(
            Arc::new(SlowEnumeration),
            Duration::from_millis(1),
        ));
        let (reporter, _events) = StatusReporter::channel(8);

        let monitor = transport.spawn_presence_monitor(Duration::from_millis(10), reporter);
        tokio::task::yield_now().await;

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let elapsed = started.elapsed();
        monitor.abort();

        assert!(elapsed < Duration::from_millis(200), "runtime stalled for {:?}", elapsed);
    }
}
