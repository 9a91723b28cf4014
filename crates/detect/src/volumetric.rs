use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// EMA must exceed this baseline before a burst can count as an attack,
/// so a quiet site waking up does not look like a flood.
const EMA_FLOOR: f64 = 5.0;

/// Burst factor over the EMA that flags an attack window.
const BURST_FACTOR: f64 = 10.0;

/// Consecutive calm windows required to stand down.
const CALM_WINDOWS_TO_CLEAR: u32 = 3;

/// State transition reported by a window rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumetricEvent {
    /// Rising edge: the gateway just entered forced-challenge mode.
    AttackStarted,
    /// The attack flag cleared after three calm windows.
    AttackCleared,
}

struct WindowState {
    ema_rps: f64,
    window_count: u64,
    window_started_at: Instant,
    under_attack: bool,
    calm_windows: u32,
}

/// Global request-volume detector.
///
/// Maintains an exponentially weighted moving average of requests per
/// second and raises the under-attack flag when a window's rate exceeds
/// ten times the established baseline. The flag is consumed by the
/// pipeline composer, which forces the browser challenge while it is set;
/// this detector never denies requests itself and knows nothing about the
/// composer.
pub struct VolumetricDetector {
    window: Duration,
    state: Mutex<WindowState>,
}

impl VolumetricDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(WindowState {
                ema_rps: 0.0,
                window_count: 0,
                window_started_at: Instant::now(),
                under_attack: false,
                calm_windows: 0,
            }),
        }
    }

    /// Record one request, rolling the window if it has elapsed. Returns a
    /// transition event when the under-attack flag changes.
    pub fn observe(&self) -> Option<VolumetricEvent> {
        self.observe_at(Instant::now())
    }

    /// [`observe`](Self::observe) with an explicit clock, for deterministic
    /// window-rollover tests.
    pub fn observe_at(&self, now: Instant) -> Option<VolumetricEvent> {
        let mut state = self.state.lock().expect("volumetric lock poisoned");
        state.window_count += 1;

        if now.duration_since(state.window_started_at) < self.window {
            return None;
        }

        // Window rollover: fold the window into the EMA and evaluate.
        let rps = state.window_count as f64 / self.window.as_secs_f64();
        state.ema_rps = if state.ema_rps == 0.0 {
            rps
        } else {
            0.9 * state.ema_rps + 0.1 * rps
        };

        let mut event = None;
        if state.ema_rps > EMA_FLOOR && rps > BURST_FACTOR * state.ema_rps {
            state.calm_windows = 0;
            if !state.under_attack {
                state.under_attack = true;
                warn!(
                    ema_rps = state.ema_rps,
                    window_rps = rps,
                    "volumetric attack detected, forcing challenge mode"
                );
                event = Some(VolumetricEvent::AttackStarted);
            }
        } else if state.under_attack {
            state.calm_windows += 1;
            if state.calm_windows >= CALM_WINDOWS_TO_CLEAR {
                state.under_attack = false;
                state.calm_windows = 0;
                info!(ema_rps = state.ema_rps, "volumetric attack cleared");
                event = Some(VolumetricEvent::AttackCleared);
            }
        }

        state.window_count = 0;
        state.window_started_at = now;
        event
    }

    /// Read-only observer consumed by the pipeline composer.
    pub fn is_under_attack(&self) -> bool {
        self.state
            .lock()
            .expect("volumetric lock poisoned")
            .under_attack
    }

    /// Current EMA baseline, for status reporting.
    pub fn ema_rps(&self) -> f64 {
        self.state.lock().expect("volumetric lock poisoned").ema_rps
    }
}
