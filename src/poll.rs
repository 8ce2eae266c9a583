//! Cooperative polling loop feeding a dashboard.
//!
//! One loop per view. It fetches, hands the outcome to its consumer, then
//! waits one interval measured from the end of that fetch, so two fetches
//! of the same loop never overlap. Pausing cancels only the wait: a fetch
//! already in flight runs to completion and its outcome is still
//! delivered. Resuming fetches immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::DataPoint;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unreadable response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SampleFetcher: Send + Sync {
    async fn fetch(&self) -> Result<DataPoint, FetchError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running,
    Paused,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollEvent {
    Sample(DataPoint),
    Failed(FetchError),
    State(PollState),
}

struct ControlInner {
    state: PollState,
    // cancelled by pause(); replaced by resume()
    wait: CancellationToken,
    resumes: u64,
}

/// Handle used by the view to drive a running [`Poller`].
#[derive(Clone)]
pub struct PollControl {
    inner: Arc<Mutex<ControlInner>>,
    resumed: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Default for PollControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PollControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControlInner {
                state: PollState::Idle,
                wait: CancellationToken::new(),
                resumes: 0,
            })),
            resumed: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> PollState {
        self.inner.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PollState::Paused
    }

    /// Stop polling after the current fetch, if any. Returns false if
    /// already paused.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PollState::Paused {
            return false;
        }
        inner.state = PollState::Paused;
        inner.wait.cancel();
        true
    }

    /// Leave the paused state and fetch straight away. Returns false if
    /// the loop was not paused.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PollState::Paused {
            return false;
        }
        inner.state = PollState::Running;
        inner.wait = CancellationToken::new();
        inner.resumes += 1;
        drop(inner);
        self.resumed.notify_one();
        true
    }

    pub fn toggle(&self) -> bool {
        if self.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn resumes(&self) -> u64 {
        self.inner.lock().resumes
    }

    /// Token for the wait after a fetch that began at resume count
    /// `resumes`, or `None` when a resume since then asks for an
    /// immediate fetch. Both are read under one lock so a pause/resume
    /// pair cannot slip between them.
    fn wait_after(&self, resumes: u64) -> Option<CancellationToken> {
        let inner = self.inner.lock();
        if inner.resumes != resumes && inner.state != PollState::Paused {
            None
        } else {
            Some(inner.wait.clone())
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // Idle -> Running, unless the view paused before the loop started
    fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PollState::Idle {
            inner.state = PollState::Running;
        }
    }
}

pub struct Poller<F> {
    fetcher: F,
    interval: Duration,
    control: PollControl,
    events: Sender<PollEvent>,
}

impl<F: SampleFetcher> Poller<F> {
    pub fn new(fetcher: F, interval: Duration, control: PollControl, events: Sender<PollEvent>) -> Self {
        Self { fetcher, interval, control, events }
    }

    fn emit(&self, event: PollEvent) {
        // a consumer that went away only matters to shutdown
        let _ = self.events.send(event);
    }

    pub async fn run(self) {
        self.control.start();
        self.emit(PollEvent::State(self.control.state()));

        while !self.control.shutdown.is_cancelled() {
            if self.control.is_paused() {
                self.emit(PollEvent::State(PollState::Paused));
                debug!("polling paused");
                while self.control.is_paused() {
                    tokio::select! {
                        _ = self.control.resumed.notified() => {}
                        _ = self.control.shutdown.cancelled() => return,
                    }
                }
                debug!("polling resumed");
                self.emit(PollEvent::State(PollState::Running));
            }

            // the fetch is not raced against pause or shutdown
            let resumes = self.control.resumes();
            match self.fetcher.fetch().await {
                Ok(point) => self.emit(PollEvent::Sample(point)),
                Err(err) => {
                    warn!(error = %err, "poll failed");
                    self.emit(PollEvent::Failed(err));
                }
            }
            // paused and resumed while fetching: the resume asks for a fresh fetch
            let Some(wait) = self.control.wait_after(resumes) else {
                continue;
            };
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wait.cancelled() => {}
                _ = self.control.shutdown.cancelled() => break,
            }
        }
    }
}

/// Spawns the loop on the current runtime.
pub fn spawn<F>(
    fetcher: F,
    interval: Duration,
    events: Sender<PollEvent>,
) -> (PollControl, tokio::task::JoinHandle<()>)
where
    F: SampleFetcher + 'static,
{
    let control = PollControl::new();
    let poller = Poller::new(fetcher, interval, control.clone(), events);
    (control, tokio::spawn(poller.run()))
}
