//! Fetch dispatch: how jobs reach a backend and how results come back.
//!
//! The engine hands every job to a [`FetchDispatcher`] and later receives the
//! outcome as an [`EngineEvent`]. Two dispatchers are provided:
//! [`QueueDispatcher`] holds jobs until the host drains them, and
//! [`WorkerDispatcher`] runs them on a background thread.

use super::controller::{FetchRequest, FetchTarget};
use crate::backend::Backend;
use crate::domain::{FetchTicket, MarketContext};
use crate::engine::EngineEvent;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchJob {
    Candles {
        ticket: FetchTicket,
        context: MarketContext,
    },
    Indicator(FetchRequest),
}

impl FetchJob {
    pub fn ticket(&self) -> FetchTicket {
        match self {
            FetchJob::Candles { ticket, .. } => *ticket,
            FetchJob::Indicator(req) => req.ticket,
        }
    }
}

pub trait FetchDispatcher {
    fn dispatch(&mut self, job: FetchJob);
}

/// Run one job to completion against `backend`.
pub fn run_job<B: Backend + ?Sized>(backend: &B, job: FetchJob) -> EngineEvent {
    match job {
        FetchJob::Candles { ticket, context } => {
            let result = backend.fetch_candles(&context.symbol, context.interval);
            EngineEvent::CandlesLoaded { ticket, context, result }
        }
        FetchJob::Indicator(req) => {
            let result = match &req.target {
                FetchTarget::BuiltIn { name, parameters } => {
                    backend.compute_indicator(&req.symbol, req.interval, name, parameters)
                }
                FetchTarget::Custom { name, source_code } => {
                    backend.compute_custom_indicator(&req.symbol, req.interval, source_code, name)
                }
            };
            EngineEvent::IndicatorComputed {
                ticket: req.ticket,
                result,
            }
        }
    }
}

/// Holds jobs until the host runs them, in whatever order it likes.
#[derive(Debug, Default)]
pub struct QueueDispatcher {
    queue: VecDeque<FetchJob>,
    dispatched: usize,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total jobs ever dispatched.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn jobs(&self) -> impl Iterator<Item = &FetchJob> {
        self.queue.iter()
    }

    pub fn pop_front(&mut self) -> Option<FetchJob> {
        self.queue.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<FetchJob> {
        self.queue.pop_back()
    }

    pub fn take_all(&mut self) -> Vec<FetchJob> {
        self.queue.drain(..).collect()
    }

    /// Run every queued job, oldest first.
    pub fn run_all<B: Backend + ?Sized>(&mut self, backend: &B) -> Vec<EngineEvent> {
        self.take_all()
            .into_iter()
            .map(|job| run_job(backend, job))
            .collect()
    }
}

impl FetchDispatcher for QueueDispatcher {
    fn dispatch(&mut self, job: FetchJob) {
        self.dispatched += 1;
        self.queue.push_back(job);
    }
}

enum WorkerCommand {
    Run(FetchJob),
    Shutdown,
}

/// Runs jobs on a named background thread, one at a time.
pub struct WorkerDispatcher {
    tx: Sender<WorkerCommand>,
    rx: Receiver<EngineEvent>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerDispatcher {
    pub fn spawn<B: Backend + Send + 'static>(backend: B) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>();
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();
        let handle = thread::Builder::new()
            .name("chartlink-fetch".into())
            .spawn(move || worker_loop(backend, cmd_rx, event_tx))?;
        Ok(Self {
            tx: cmd_tx,
            rx: event_rx,
            handle: Some(handle),
        })
    }

    /// Completed events available right now.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next completed event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl FetchDispatcher for WorkerDispatcher {
    fn dispatch(&mut self, job: FetchJob) {
        let ticket = job.ticket();
        if self.tx.send(WorkerCommand::Run(job)).is_err() {
            tracing::error!(%ticket, "fetch worker is gone; job dropped");
        }
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<B: Backend>(backend: B, rx: Receiver<WorkerCommand>, tx: Sender<EngineEvent>) {
    tracing::debug!(backend = backend.name(), "fetch worker started");
    loop {
        match rx.recv() {
            Ok(WorkerCommand::Shutdown) | Err(_) => break,
            Ok(WorkerCommand::Run(job)) => {
                let event = run_job(&backend, job);
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("fetch worker stopped");
}
