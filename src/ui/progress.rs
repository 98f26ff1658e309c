//! Dual progress bars for the build, rendered via `indicatif`.
//!
//! Three elements are stacked vertically:
//! - Overall bar — coarse build progress across all phases
//! - Task bar — progress of the current phase's work item
//! - Tail line — the child's unterminated output line (progress-bar
//!   redraws land here) and the idle heartbeat
//!
//! Completed output lines are printed above the bars through
//! `MultiProgress` so the bars stay pinned at the bottom.

use crate::supervisor::{BuildOutcome, DisplaySink, ProgressSink};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub struct BuildUi {
    multi: MultiProgress,
    overall_bar: ProgressBar,
    task_bar: ProgressBar,
    tail_bar: ProgressBar,
    echo_output: bool,
}

impl BuildUi {
    /// Create the UI and add all three elements to the multiplex renderer.
    ///
    /// With `echo_output` disabled only the bars are shown; the child's
    /// text lines are dropped instead of printed.
    pub fn new(echo_output: bool) -> Self {
        let multi = MultiProgress::new();

        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let overall_bar = multi.add(ProgressBar::new(100));
        overall_bar.set_style(bar_style.clone());
        overall_bar.set_prefix("Overall");

        let task_bar = multi.add(ProgressBar::new(100));
        task_bar.set_style(bar_style);
        task_bar.set_prefix("   Task");

        let tail_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {msg}")
            .expect("progress bar template is a valid static string");

        let tail_bar = multi.add(ProgressBar::new(0));
        tail_bar.set_style(tail_style);
        tail_bar.set_prefix("       ");

        Self {
            multi,
            overall_bar,
            task_bar,
            tail_bar,
            echo_output,
        }
    }

    /// Split into the two sink handles the supervisor consumes.
    ///
    /// The bars are shared; `indicatif` handles the synchronization.
    pub fn sinks(&self) -> (UiDisplay, UiProgress) {
        (
            UiDisplay {
                multi: self.multi.clone(),
                tail_bar: self.tail_bar.clone(),
                echo_output: self.echo_output,
            },
            UiProgress {
                overall_bar: self.overall_bar.clone(),
                task_bar: self.task_bar.clone(),
                tail_bar: self.tail_bar.clone(),
            },
        )
    }

    /// Stop the bars and print the closing summary line.
    pub fn finish(&self, outcome: &BuildOutcome) {
        self.tail_bar.finish_and_clear();
        self.overall_bar.finish();
        self.task_bar.finish();
        let summary = match outcome {
            BuildOutcome::Success => {
                format!("{} Build completed successfully", style("✓").green().bold())
            }
            BuildOutcome::Failed { exit_code } => format!(
                "{} Build failed with exit code {}",
                style("✗").red().bold(),
                style(exit_code).red()
            ),
            BuildOutcome::Cancelled => {
                format!("{} Build cancelled", style("✗").yellow().bold())
            }
        };
        if self.multi.println(&summary).is_err() {
            eprintln!("{summary}");
        }
    }
}

/// Display half of the UI: completed lines print above the bars, the
/// partial line lives in the tail element.
pub struct UiDisplay {
    multi: MultiProgress,
    tail_bar: ProgressBar,
    echo_output: bool,
}

impl DisplaySink for UiDisplay {
    fn line(&mut self, text: &str) {
        if !self.echo_output {
            return;
        }
        if self.multi.println(text).is_err() {
            eprintln!("{text}");
        }
        self.tail_bar.set_message(String::new());
    }

    fn partial(&mut self, text: &str) {
        if self.echo_output {
            self.tail_bar.set_message(text.to_string());
        }
    }
}

/// Progress half of the UI.
pub struct UiProgress {
    overall_bar: ProgressBar,
    task_bar: ProgressBar,
    tail_bar: ProgressBar,
}

impl ProgressSink for UiProgress {
    fn overall(&mut self, percent: u8, message: &str) {
        self.overall_bar.set_position(u64::from(percent));
        self.overall_bar.set_message(message.to_string());
    }

    fn task(&mut self, percent: u8, message: &str) {
        self.task_bar.set_position(u64::from(percent));
        self.task_bar.set_message(message.to_string());
    }

    fn heartbeat(&mut self, frame: char) {
        self.tail_bar
            .set_message(format!("{} {frame}", style("still processing...").dim()));
    }

    fn heartbeat_clear(&mut self) {
        self.tail_bar.set_message(String::new());
    }
}
