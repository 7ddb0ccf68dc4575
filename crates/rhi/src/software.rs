//! Deterministic in-process device.
//!
//! [`SoftwareGpu`] and [`SoftwarePresenter`] implement the driver capability
//! traits without any real GPU: submitted work "completes" according to a
//! [`CompletionMode`], and surface images are plain handles. The demo binary
//! runs the full frame loop against them, and the test suites use the
//! [`Manual`](CompletionMode::Manual) and [`Delayed`](CompletionMode::Delayed)
//! modes to hold frames in flight at exact points.
//!
//! The device keeps an event log ([`GpuEvent`]) so tests can assert the
//! ordering of executes, signals, and waits.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::command::Command;
use crate::driver::{FenceValue, GpuQueue, PresentTarget, SurfaceImage, SyncMode};
use crate::error::{RhiError, RhiResult};

/// How submitted work reaches completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Every signal completes the moment it is enqueued.
    Immediate,
    /// Nothing completes until [`SoftwareGpu::complete_through`] is called.
    Manual,
    /// Each signal completes the given duration after it is enqueued,
    /// modeling a GPU that progresses independently of the CPU.
    Delayed(Duration),
}

/// One observable device operation, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuEvent {
    /// A command stream was submitted.
    Execute {
        /// Number of commands in the stream.
        commands: usize,
    },
    /// A fence signal was enqueued.
    Signal(FenceValue),
    /// A blocking wait for a fence value began.
    Wait(FenceValue),
}

struct GpuState {
    // (value, instant it completes) for Delayed mode, in signal order
    pending: Vec<(FenceValue, Instant)>,
    completed: FenceValue,
    lost: bool,
    events: Vec<GpuEvent>,
}

impl GpuState {
    /// Retires due pending signals and returns the completed value as of `now`.
    fn completed_at(&mut self, mode: CompletionMode, now: Instant) -> FenceValue {
        if matches!(mode, CompletionMode::Delayed(_)) {
            while let Some(&(value, due)) = self.pending.first() {
                if due > now {
                    break;
                }
                self.completed = self.completed.max(value);
                self.pending.remove(0);
            }
        }
        self.completed
    }
}

/// In-process [`GpuQueue`] implementation.
pub struct SoftwareGpu {
    mode: CompletionMode,
    state: Mutex<GpuState>,
    progressed: Condvar,
}

impl SoftwareGpu {
    /// Creates a queue with the given completion mode.
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            state: Mutex::new(GpuState {
                pending: Vec::new(),
                completed: FenceValue::ZERO,
                lost: false,
                events: Vec::new(),
            }),
            progressed: Condvar::new(),
        }
    }

    /// Advances completion up to `value` and wakes waiters.
    ///
    /// Only meaningful in [`CompletionMode::Manual`]; in the other modes
    /// completion progresses on its own.
    pub fn complete_through(&self, value: FenceValue) {
        let mut state = self.state.lock().unwrap();
        state.completed = state.completed.max(value);
        debug!(%value, "software gpu advanced");
        self.progressed.notify_all();
    }

    /// Simulates device loss: every subsequent operation fails and current
    /// waiters are woken with [`RhiError::DeviceLost`].
    pub fn set_lost(&self) {
        self.state.lock().unwrap().lost = true;
        self.progressed.notify_all();
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<GpuEvent> {
        self.state.lock().unwrap().events.clone()
    }

    fn lost_error() -> RhiError {
        RhiError::DeviceLost("software device marked lost".into())
    }
}

impl GpuQueue for SoftwareGpu {
    fn execute(&self, commands: &[Command]) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(Self::lost_error());
        }
        state.events.push(GpuEvent::Execute {
            commands: commands.len(),
        });
        Ok(())
    }

    fn signal(&self, value: FenceValue) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(Self::lost_error());
        }
        state.events.push(GpuEvent::Signal(value));
        match self.mode {
            CompletionMode::Immediate => state.completed = state.completed.max(value),
            CompletionMode::Manual => {}
            CompletionMode::Delayed(delay) => state.pending.push((value, Instant::now() + delay)),
        }
        self.progressed.notify_all();
        Ok(())
    }

    fn completed_value(&self) -> FenceValue {
        let mut state = self.state.lock().unwrap();
        state.completed_at(self.mode, Instant::now())
    }

    fn wait_for_value(&self, value: FenceValue, timeout: Option<Duration>) -> RhiResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock().unwrap();
        if state.lost {
            return Err(Self::lost_error());
        }
        state.events.push(GpuEvent::Wait(value));

        loop {
            if state.lost {
                return Err(Self::lost_error());
            }

            let now = Instant::now();
            if state.completed_at(self.mode, now) >= value {
                return Ok(true);
            }
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Ok(false);
                }
            }

            // Sleep until the value is due, the deadline passes, or the
            // queue makes progress; re-check in all cases.
            let due = state
                .pending
                .iter()
                .find(|(pending, _)| *pending >= value)
                .map(|(_, due)| *due);
            let wake = match (due, deadline) {
                (Some(due), Some(deadline)) => Some(due.min(deadline)),
                (Some(due), None) => Some(due),
                (None, Some(deadline)) => Some(deadline),
                (None, None) => None,
            };
            state = match wake {
                Some(instant) => {
                    let (guard, _) = self
                        .progressed
                        .wait_timeout(state, instant.saturating_duration_since(now))
                        .unwrap();
                    guard
                }
                None => self.progressed.wait(state).unwrap(),
            };
        }
    }
}

struct PresenterState {
    tearing: bool,
    next_id: u64,
    built: usize,
    outstanding: usize,
    current: u32,
    forced_next: Option<u32>,
    fail_builds: bool,
    presents: Vec<SyncMode>,
}

/// In-process [`PresentTarget`] implementation.
///
/// Cloning yields a probe over the same shared state, so tests can keep one
/// clone for inspection while the surface manager owns the other.
#[derive(Clone)]
pub struct SoftwarePresenter {
    shared: Arc<Mutex<PresenterState>>,
}

impl SoftwarePresenter {
    /// Creates a presenter, optionally reporting tearing support.
    pub fn new(tearing: bool) -> Self {
        Self {
            shared: Arc::new(Mutex::new(PresenterState {
                tearing,
                next_id: 0,
                built: 0,
                outstanding: 0,
                current: 0,
                forced_next: None,
                fail_builds: false,
                presents: Vec::new(),
            })),
        }
    }

    /// Number of images currently owned by callers (built minus released).
    pub fn outstanding_images(&self) -> usize {
        self.shared.lock().unwrap().outstanding
    }

    /// Sync modes of every present so far, in order.
    pub fn presents(&self) -> Vec<SyncMode> {
        self.shared.lock().unwrap().presents.clone()
    }

    /// Makes the next image rebuild fail, simulating device loss.
    pub fn set_fail_builds(&self, fail: bool) {
        self.shared.lock().unwrap().fail_builds = fail;
    }

    /// Overrides the index reported after the next present, modeling a
    /// display engine that hands back images out of order.
    pub fn force_next_index(&self, index: u32) {
        self.shared.lock().unwrap().forced_next = Some(index);
    }
}

impl PresentTarget for SoftwarePresenter {
    fn build_images(
        &mut self,
        width: u32,
        height: u32,
        count: usize,
    ) -> RhiResult<Vec<SurfaceImage>> {
        let mut state = self.shared.lock().unwrap();
        if state.fail_builds {
            return Err(RhiError::DeviceLost(
                "simulated device loss during image rebuild".into(),
            ));
        }
        let images = (0..count)
            .map(|_| {
                state.next_id += 1;
                SurfaceImage::new(state.next_id, width, height)
            })
            .collect();
        state.built = count;
        state.outstanding += count;
        state.current = 0;
        debug!(width, height, count, "software presenter built images");
        Ok(images)
    }

    fn release_image(&mut self, image: SurfaceImage) {
        let mut state = self.shared.lock().unwrap();
        state.outstanding -= 1;
        drop(image);
    }

    fn present(&mut self, sync: SyncMode) -> RhiResult<()> {
        let mut state = self.shared.lock().unwrap();
        if state.built == 0 {
            return Err(RhiError::DeviceLost("present without built images".into()));
        }
        state.presents.push(sync);
        state.current = match state.forced_next.take() {
            Some(index) => index,
            None => (state.current + 1) % state.built as u32,
        };
        Ok(())
    }

    fn current_index(&self) -> u32 {
        self.shared.lock().unwrap().current
    }

    fn allows_tearing(&self) -> bool {
        self.shared.lock().unwrap().tearing
    }
}
