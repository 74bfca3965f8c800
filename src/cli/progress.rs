//! Terminal progress bars
//!
//! One bar per document (export) or table (reimport), all drawn under a shared
//! [`MultiProgress`].

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::pipeline::ProgressSink;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// [`ProgressSink`] drawing indicatif bars
pub struct BarProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    style: ProgressStyle,
}

impl BarProgress {
    /// Create a sink drawing to stderr
    pub fn new() -> Self {
        Self::with_target(MultiProgress::new())
    }

    /// Create a sink that draws nothing
    pub fn hidden() -> Self {
        Self::with_target(MultiProgress::with_draw_target(
            indicatif::ProgressDrawTarget::hidden(),
        ))
    }

    fn with_target(multi: MultiProgress) -> Self {
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    /// Mark every bar finished, leaving it on screen
    pub fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        for bar in bars.values() {
            bar.finish();
        }
    }

    /// `(position, length)` of the bar named `name`
    pub fn position(&self, name: &str) -> Option<(u64, u64)> {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.get(name)
            .map(|bar| (bar.position(), bar.length().unwrap_or(0)))
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn update(&self, name: &str, done: u64, total: u64) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let bar = bars.entry(name.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(self.style.clone());
            bar.set_message(name.to_string());
            bar
        });
        bar.set_length(total);
        bar.set_position(done);
    }
}
