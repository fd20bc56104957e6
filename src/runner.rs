use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, Instant};
use crate::normalize::setpoint_to_device;
use crate::protos::{RunEvent, Speed};
use crate::ptzdev::DeviceHandle;
use crate::ptzerror::PTZError;
use crate::schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  Idle,
  Running,
  Completed,
  Aborted,
}

#[derive(Debug)]
pub enum AbortCause {
  Connect(PTZError),
  PositionSpace(PTZError),
  Cancelled,
}

#[derive(Debug)]
pub struct EntryFailure {
  pub index: usize,
  pub offset: f64,
  pub error: PTZError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
  pub attempted: usize,
  pub failed: usize,
  pub failures: Vec<EntryFailure>,
}

#[derive(Debug)]
pub enum RunOutcome {
  Completed(RunSummary),
  Aborted { cause: AbortCause, summary: RunSummary },
}

/// Stops a running schedule at its next wake-up.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
  pub fn cancel(&self) {
    self.0.send_replace(true);
  }
  pub fn is_cancelled(&self) -> bool {
    *self.0.borrow()
  }
}

/// Dispatches a schedule's setpoints in order at `run_start + offset`.
/// Deadlines never move: a slow command only delays the entries it overruns.
pub struct ScheduleRunner {
  state: RunState,
  events: Option<mpsc::UnboundedSender<RunEvent>>,
  cancel_tx: Arc<watch::Sender<bool>>,
  cancel_rx: watch::Receiver<bool>,
}

impl ScheduleRunner {
  pub fn new() -> ScheduleRunner {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    ScheduleRunner {
      state: RunState::Idle,
      events: None,
      cancel_tx: Arc::new(cancel_tx),
      cancel_rx,
    }
  }
  pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
    self.events = Some(events);
    self
  }
  pub fn state(&self) -> RunState {
    self.state
  }
  pub fn cancel_handle(&self) -> CancelHandle {
    CancelHandle(self.cancel_tx.clone())
  }

  fn emit(&self, ev: RunEvent) {
    if let Some(events) = &self.events {
      events.send(ev).ok();
    }
  }

  fn abort(&mut self, cause: AbortCause, summary: RunSummary) -> RunOutcome {
    tracing::error!(cause = ?cause, attempted = summary.attempted, "schedule aborted");
    let reason = match &cause {
      AbortCause::Connect(e) => format!("connect failed: {}", e),
      AbortCause::PositionSpace(e) => format!("position space query failed: {}", e),
      AbortCause::Cancelled => "cancelled".to_string(),
    };
    self.emit(RunEvent::Aborted(reason));
    self.state = RunState::Aborted;
    RunOutcome::Aborted { cause, summary }
  }

  async fn sleep_until(&mut self, deadline: Instant) {
    let rx = &mut self.cancel_rx;
    tokio::select! {
      _ = time::sleep_until(deadline) => {},
      _ = cancelled(rx) => {},
    }
  }

  fn is_cancelled(&self) -> bool {
    *self.cancel_rx.borrow()
  }

  pub async fn run(&mut self, schedule: &Schedule, device: &DeviceHandle) -> RunOutcome {
    self.state = RunState::Running;
    self.cancel_tx.send_replace(false);
    let run_start = Instant::now();
    let mut summary = RunSummary::default();
    tracing::info!(entries = schedule.len(), device = %device, "schedule started");

    let token = match device.connect().await {
      Ok(token) => token,
      Err(e) => return self.abort(AbortCause::Connect(e), summary),
    };
    // device configuration is fixed for the length of a run
    let space = match device.get_position_space().await {
      Ok(space) => space,
      Err(e) => return self.abort(AbortCause::PositionSpace(e), summary),
    };
    tracing::debug!(?space, profile = %token, "position space cached");

    for (index, sp) in schedule.entries().iter().enumerate() {
      let offset = sp.time_offset_seconds;
      let deadline = run_start + Duration::from_secs_f64(offset);
      let now = Instant::now();
      if now < deadline {
        self.emit(RunEvent::Waiting { offset, wait: deadline - now });
        self.sleep_until(deadline).await;
      }
      if self.is_cancelled() {
        return self.abort(AbortCause::Cancelled, summary);
      }

      let position = setpoint_to_device(sp, &space);
      tracing::info!(index, offset, pan = position.pan, tilt = position.tilt,
        zoom = position.zoom, "dispatching absolute move");
      self.emit(RunEvent::Dispatching { setpoint: *sp });
      summary.attempted += 1;
      if let Err(e) = device.absolute_move(&token, position, Speed::FULL).await {
        tracing::warn!(index, offset, error = %e, "absolute move failed, continuing");
        self.emit(RunEvent::MoveFailed { index, offset, error: e.to_string() });
        summary.failed += 1;
        summary.failures.push(EntryFailure { index, offset, error: e });
      }
    }

    tracing::info!(attempted = summary.attempted, failed = summary.failed, "schedule complete");
    self.emit(RunEvent::Complete { attempted: summary.attempted, failed: summary.failed });
    self.state = RunState::Completed;
    RunOutcome::Completed(summary)
  }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
  loop {
    if *rx.borrow_and_update() {
      return;
    }
    if rx.changed().await.is_err() {
      std::future::pending::<()>().await;
    }
  }
}
