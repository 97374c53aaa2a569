//! Interactive progress rendering.

use hoist_core::{ProgressObserver, ProgressSample};
use indicatif::{ProgressBar, ProgressStyle};

/// An indicatif bar fed by the retriever's progress samples. Each
/// retrieval (primary, then possibly recovery) gets a fresh bar.
pub struct RetrievalBar {
    bar: ProgressBar,
}

impl RetrievalBar {
    pub fn new() -> Self {
        Self { bar: make_bar() }
    }
}

impl Default for RetrievalBar {
    fn default() -> Self {
        Self::new()
    }
}

fn make_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {percent}%")
            .unwrap()
            .progress_chars("=> "),
    );
    bar
}

impl ProgressObserver for RetrievalBar {
    fn on_sample(&mut self, sample: &ProgressSample) {
        self.bar
            .set_position((sample.fraction_complete * 100.0).round() as u64);
        self.bar.set_message(format!(
            "{} @ {} eta {}",
            sample.size,
            sample.rate,
            sample.eta.as_deref().unwrap_or("-")
        ));
    }

    fn on_finish(&mut self) {
        self.bar.finish_and_clear();
        self.bar = make_bar();
    }
}
