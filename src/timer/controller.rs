use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use tokio::{runtime::Handle, task::JoinHandle, time};

use super::CountdownState;
use crate::audio::{AlertChannel, AlertPlayer};
use crate::error::ScanError;
use crate::events::{UiBridge, UiEvent};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const FALLBACK_DURATION_SECS: u64 = 5;

/// Reads a stored countdown duration as whole seconds. Anything that isn't a
/// non-negative integer falls back to the default.
pub fn parse_duration(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => {
            log_warn!(
                "Countdown duration {raw:?} is not whole seconds; using {FALLBACK_DURATION_SECS}"
            );
            FALLBACK_DURATION_SECS
        }
    }
}

/// One-second countdown that rings the countdown alert when it reaches zero.
/// At most one ticker task is alive at a time.
#[derive(Clone)]
pub struct CountdownController {
    state: Arc<Mutex<CountdownState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
    alerts: Arc<AlertPlayer>,
    ui: UiBridge,
    tick_interval: Duration,
    runtime: Handle,
}

impl CountdownController {
    /// Must be called from within a tokio runtime; ticks run on it.
    pub fn new(alerts: Arc<AlertPlayer>, ui: UiBridge, tick_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CountdownState::new())),
            ticker: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            alerts,
            ui,
            tick_interval,
            runtime: Handle::current(),
        }
    }

    pub fn snapshot(&self) -> CountdownState {
        self.lock_state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_running()
    }

    /// Starts counting down from `duration_secs`. Returns `Ok(false)` and
    /// leaves the running countdown untouched if one is already going.
    pub fn start(&self, duration_secs: u64) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScanError::NotActive.into());
        }
        if duration_secs == 0 {
            return Err(anyhow!("countdown duration must be greater than zero"));
        }

        {
            let mut state = self.lock_state();
            if state.is_running() {
                log_debug!("Countdown already running; ignoring start");
                return Ok(false);
            }
            state.begin(duration_secs);
        }

        self.spawn_ticker();
        self.ui.emit(UiEvent::CountdownStarted {
            remaining_secs: duration_secs,
        });
        log_info!("Countdown started for {duration_secs}s");
        Ok(true)
    }

    /// Stops a running countdown without ringing. Returns `true` if one was
    /// running.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.lock_state();
            if !state.is_running() {
                return false;
            }
            state.reset();
        }
        self.abort_ticker();
        self.ui.emit(UiEvent::CountdownHidden);
        log_info!("Countdown cancelled");
        true
    }

    /// Cancels and refuses any later start.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel();
        self.abort_ticker();
    }

    fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = Arc::clone(&self.state);
        let alerts = Arc::clone(&self.alerts);
        let ui = self.ui.clone();
        let period = self.tick_interval;

        let handle = self.runtime.spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            loop {
                interval.tick().await;

                let remaining = {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    match guard.tick() {
                        Some(remaining) => remaining,
                        None => break,
                    }
                };

                ui.emit(UiEvent::CountdownTick {
                    remaining_secs: remaining,
                });
                log_debug!("Countdown tick: {remaining}s left");

                if remaining == 0 {
                    ui.emit(UiEvent::CountdownHidden);
                    log_info!("Countdown finished");
                    alerts.start(AlertChannel::Countdown);
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    fn abort_ticker(&self) {
        if let Some(handle) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CountdownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
