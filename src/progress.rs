//! Progress reporting for the two fan-out phases: linking videos to the
//! archive and scoring comment sentiment.
//!
//! On a terminal each phase draws an indicatif bar. With `--log-only` the
//! bar is hidden and the phase emits a `tracing` line every
//! [`Phase::log_every`] items instead, plus one line when it finishes.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Human-readable elapsed time: seconds under a minute, minutes above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// One item per channel video handed to the linker.
    Link,
    /// One item per sketch still missing sentiment.
    Sentiment,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Link => "link",
            Phase::Sentiment => "sentiment",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Phase::Link => "Linking videos",
            Phase::Sentiment => "Analyzing video comments",
        }
    }

    /// Items between log lines in log-only mode. Sentiment items are
    /// slower (one scorer call per comment), so they log more often.
    pub fn log_every(self) -> u64 {
        match self {
            Phase::Link => 500,
            Phase::Sentiment => 100,
        }
    }
}

/// Whether item `current` of `total` gets a log line.
fn is_checkpoint(current: u64, total: u64, every: u64) -> bool {
    total > 0 && every > 0 && (current % every == 0 || current == total)
}

/// Progress of one phase over a known number of items.
pub struct PhaseProgress {
    phase: Phase,
    bar: ProgressBar,
    total: u64,
    done: u64,
    started: Instant,
}

impl PhaseProgress {
    pub fn start(phase: Phase, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(phase.message());
        Self {
            phase,
            bar,
            total,
            done: 0,
            started: Instant::now(),
        }
    }

    /// Count one finished item.
    pub fn advance(&mut self) {
        self.done += 1;
        self.bar.inc(1);
        if is_log_only() && is_checkpoint(self.done, self.total, self.phase.log_every()) {
            let pct = 100.0 * self.done as f64 / self.total as f64;
            info!(phase = self.phase.name(), current = self.done, total = self.total, "{:.1}% done", pct);
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Close the bar with `summary`; log-only mode logs it instead.
    pub fn finish(self, summary: String) {
        if is_log_only() {
            info!(phase = self.phase.name(), elapsed = %format_duration(self.elapsed()), "{}", summary);
        }
        self.bar.finish_with_message(summary);
    }
}
