//! Progress reporting for import phases.
//!
//! The CLI draws an `indicatif` bar on stderr; tests and library callers
//! use [`NoopReporter`].

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::types::PackageType;

/// Receives per-package progress from a running phase.
pub trait ProgressReporter: Send + Sync {
    /// A phase over `total` packages of one category begins.
    fn start(&self, phase: &str, category: &PackageType, total: u64);

    /// One package finished, successfully or not.
    fn package_done(&self, full_name: &str, ok: bool);

    /// The phase ended.
    fn finish(&self);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _phase: &str, _category: &PackageType, _total: u64) {}
    fn package_done(&self, _full_name: &str, _ok: bool) {}
    fn finish(&self) {}
}

/// Progress bar on stderr, one bar per category phase.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    failed: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(None, target),
            failed: AtomicU64::new(0),
        }
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, phase: &str, category: &PackageType, total: u64) {
        self.failed.store(0, Ordering::Relaxed);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.set_length(total);
        self.bar.set_message(format!("{phase} {category}"));
        self.bar.reset();
    }

    fn package_done(&self, full_name: &str, ok: bool) {
        if !ok {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.bar.println(format!("  failed: {full_name}"));
        }
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
