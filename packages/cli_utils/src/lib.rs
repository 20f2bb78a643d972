#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the s3pub CLI.
//!
//! Provides `indicatif`-backed progress bars behind the [`ProgressCallback`]
//! trait, plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use s3pub_models::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Creates a byte-count bar for an upload batch. The length is filled in
    /// by [`ProgressCallback::set_total()`] once the plan is known.
    #[must_use]
    pub fn bytes_bar(multi: &MultiProgress) -> Arc<Self> {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg}\n{wide_bar:.cyan/dim} {bytes}/{total_bytes} {percent}% [{eta}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );

        Arc::new(Self { bar })
    }

    /// Creates a spinner that only moves when [`ProgressCallback::tick()`]
    /// is called.
    #[must_use]
    pub fn spinner(multi: &MultiProgress, message: &str) -> Arc<Self> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{msg} {spinner:.yellow}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("|/-\\ "),
        );
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }

    /// Removes the bar from the terminal if nothing finished it.
    pub fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn tick(&self) {
        self.bar.tick();
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Logging is off unless `RUST_LOG` is set. Returns the [`MultiProgress`]
/// that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn bytes_bar_tracks_total_and_position() {
        let progress = IndicatifProgress::bytes_bar(&hidden());

        progress.set_total(300);
        progress.set_position(120);

        assert_eq!(progress.bar.length(), Some(300));
        assert_eq!(progress.bar.position(), 120);
    }

    #[test]
    fn finish_keeps_message() {
        let progress = IndicatifProgress::spinner(&hidden(), "Invalidation request I1");
        progress.tick();
        progress.finish("Done.".to_string());

        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "Done.");
    }

    #[test]
    fn clear_finishes_unused_bars() {
        let progress = IndicatifProgress::bytes_bar(&hidden());
        progress.clear();
        assert!(progress.bar.is_finished());
    }
}
