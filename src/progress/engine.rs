//! Stateful classifier turning normalized output lines into progress
//! updates.
//!
//! Classification tries each signal source in order of trustworthiness and
//! stops at the first one that actually moved a bar:
//!
//! 1. a structured progress bar rendering with item counts
//! 2. a bare percentage co-occurring with a build keyword
//! 3. the ordered marker table (may switch the phase)
//! 4. a `compiling ... (N of M)` counter
//! 5. a timed line-count nudge for long silent stretches
//!
//! Every path is monotonic: the overall percentage never decreases for the
//! life of one child, and the task percentage only decreases by resetting
//! to 0 on a phase change.

use super::markers::match_marker;
use super::{Phase, ProgressSnapshot};
use crate::stream::ProtocolUpdate;
use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

// Matches renderings like
//   "PASS 1: 72.5%|████████████████████▏ | 174/240, module_name"
//   "Onefile Payload: 1.1%|▎ | 102/9164, numpy.libs\msvcp140-"
static PROGRESS_BAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^:]+):\s+(\d+(?:\.\d+)?)%.*?\|\s*(\d+)/(\d+),\s*(.+)").unwrap()
});

static PERCENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").unwrap());

static MODULE_COUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)compiling.*?\((\d+)\s+of\s+(\d+)\)").unwrap());

const PERCENT_KEYWORDS: &[&str] = &["progress", "done", "compiling", "building", "generating"];

/// A single change to one of the two progress bars.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Overall { percent: u8, message: String },
    Task { percent: u8, message: String },
}

/// Numeric knobs of the timed line-count fallback.
///
/// The defaults reproduce the original tool's behavior; they are tuning
/// artifacts, not a contract, hence configurable.
#[derive(Debug, Clone)]
pub struct EngineTuning {
    /// Silence window before the fallback may fire.
    pub idle_after: Duration,
    /// Overall percentage the fallback starts counting from.
    pub idle_base: u8,
    /// One extra percentage point per this many output lines.
    pub lines_per_point: u64,
    /// The fallback never pushes the overall bar past this value.
    pub idle_cap: u8,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(5),
            idle_base: 30,
            lines_per_point: 20,
            idle_cap: 90,
        }
    }
}

/// Progress inference engine; one instance per child process.
pub struct ProgressEngine {
    phase: Phase,
    snapshot: ProgressSnapshot,
    line_count: u64,
    last_change: Instant,
    tuning: EngineTuning,
}

impl ProgressEngine {
    pub fn new(now: Instant) -> Self {
        Self::with_tuning(now, EngineTuning::default())
    }

    pub fn with_tuning(now: Instant, tuning: EngineTuning) -> Self {
        Self {
            phase: Phase::Initialization,
            snapshot: ProgressSnapshot::default(),
            line_count: 0,
            last_change: now,
            tuning,
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply an explicit `PROGRESS:<int>:<text>` sub-protocol update.
    ///
    /// Goes through the same monotonic clamp as every other overall update,
    /// so a late or reordered explicit marker cannot move the bar backwards.
    pub fn apply_protocol(&mut self, update: &ProtocolUpdate, now: Instant) -> Vec<ProgressUpdate> {
        let mut out = Vec::new();
        self.set_overall(update.percent, &update.message, now, &mut out);
        out
    }

    /// Classify one normalized line, returning the bar changes it caused.
    pub fn observe_line(&mut self, line: &str, now: Instant) -> Vec<ProgressUpdate> {
        self.line_count += 1;
        let mut out = Vec::new();

        if let Some(caps) = PROGRESS_BAR_REGEX.captures(line) {
            let label = caps[1].trim().to_string();
            let percent: f64 = caps[2].parse().unwrap_or(0.0);
            let current: u64 = caps[3].parse().unwrap_or(0);
            let total: u64 = caps[4].parse().unwrap_or(0);
            let item = caps[5].trim();

            let upper = label.to_ascii_uppercase();
            let message = if upper.contains("PASS") {
                format!("Compiling {item} ({current}/{total}) - {percent:.1}%")
            } else if upper.contains("ONEFILE") || upper.contains("PAYLOAD") {
                format!("Packaging {item} ({current}/{total}) - {percent:.1}%")
            } else {
                format!("{label}: {item} ({current}/{total}) - {percent:.1}%")
            };
            self.set_task(percent as u8, &message, now, &mut out);
            if !out.is_empty() {
                return out;
            }
        }

        let lower = line.to_ascii_lowercase();
        if PERCENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
            && let Some(caps) = PERCENT_REGEX.captures(line)
        {
            let percent: f64 = caps[1].parse().unwrap_or(0.0);
            self.set_task(percent as u8, &truncate_status(line.trim()), now, &mut out);
            if !out.is_empty() {
                return out;
            }
        }

        if let Some(rule) = match_marker(line) {
            if rule.phase != self.phase {
                self.phase = rule.phase;
                self.snapshot.task_percent = 0;
                out.push(ProgressUpdate::Task {
                    percent: 0,
                    message: rule.phase.message().to_string(),
                });
            }
            let (start, end) = self.phase.bounds();
            let span = f64::from(end - start);
            let overall = start + (f64::from(rule.task_progress) / 100.0 * span) as u8;
            self.set_overall(overall, self.phase.message(), now, &mut out);
            self.set_task(rule.task_progress, rule.message, now, &mut out);
            if !out.is_empty() {
                return out;
            }
        }

        if let Some(caps) = MODULE_COUNT_REGEX.captures(line) {
            let current: u64 = caps[1].parse().unwrap_or(0);
            let total: u64 = caps[2].parse().unwrap_or(0);
            if total > 0 {
                let percent = (current * 100 / total).min(100) as u8;
                let message = format!("Compiling module {current} of {total}");
                self.set_task(percent, &message, now, &mut out);
                if !out.is_empty() {
                    return out;
                }
            }
        }

        // Nothing moved: nudge the overall bar from the line count once the
        // output has been signal-free for the idle window.
        if now.duration_since(self.last_change) > self.tuning.idle_after {
            let bump = (self.line_count / self.tuning.lines_per_point).min(100) as u8;
            let nudged = self
                .tuning
                .idle_cap
                .min(self.tuning.idle_base.saturating_add(bump));
            let message = format!("Building... (line {})", self.line_count);
            self.set_overall(nudged, &message, now, &mut out);
        }

        out
    }

    fn set_overall(&mut self, percent: u8, message: &str, now: Instant, out: &mut Vec<ProgressUpdate>) {
        let percent = percent.min(100);
        if percent > self.snapshot.overall_percent {
            self.snapshot.overall_percent = percent;
            self.snapshot.overall_message = message.to_string();
            self.last_change = now;
            out.push(ProgressUpdate::Overall {
                percent,
                message: message.to_string(),
            });
        }
    }

    fn set_task(&mut self, percent: u8, message: &str, now: Instant, out: &mut Vec<ProgressUpdate>) {
        let percent = percent.min(100);
        if percent > self.snapshot.task_percent {
            self.snapshot.task_percent = percent;
            self.snapshot.task_message = message.to_string();
            self.last_change = now;
            out.push(ProgressUpdate::Task {
                percent,
                message: message.to_string(),
            });
        }
    }
}

fn truncate_status(text: &str) -> String {
    if text.chars().count() > 100 {
        let head: String = text.chars().take(97).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (ProgressEngine, Instant) {
        let now = Instant::now();
        (ProgressEngine::new(now), now)
    }

    fn overall_of(updates: &[ProgressUpdate]) -> Option<(u8, String)> {
        updates.iter().rev().find_map(|u| match u {
            ProgressUpdate::Overall { percent, message } => Some((*percent, message.clone())),
            ProgressUpdate::Task { .. } => None,
        })
    }

    fn task_of(updates: &[ProgressUpdate]) -> Option<(u8, String)> {
        updates.iter().rev().find_map(|u| match u {
            ProgressUpdate::Task { percent, message } => Some((*percent, message.clone())),
            ProgressUpdate::Overall { .. } => None,
        })
    }

    #[test]
    fn structured_bar_line_sets_task_percent_and_message() {
        let (mut engine, now) = engine();
        let updates = engine.observe_line(
            "PASS 1: 72.5%|████████████████████▏ | 174/240, module_name",
            now,
        );
        let (percent, message) = task_of(&updates).expect("task update");
        assert_eq!(percent, 72);
        assert!(message.contains("module_name"));
        assert!(message.contains("174/240"));
        assert!(message.starts_with("Compiling"));
    }

    #[test]
    fn onefile_payload_bar_reads_as_packaging() {
        let (mut engine, now) = engine();
        let updates =
            engine.observe_line("Onefile Payload: 1.1%|▎ | 102/9164, numpy.libs", now);
        let (percent, message) = task_of(&updates).expect("task update");
        assert_eq!(percent, 1);
        assert!(message.starts_with("Packaging"));
        assert!(message.contains("102/9164"));
    }

    #[test]
    fn bare_percent_needs_a_build_keyword() {
        let (mut engine, now) = engine();
        assert!(engine.observe_line("humidity is at 45% today", now).is_empty());
        let updates = engine.observe_line("compiling helpers: 45% done", now);
        let (percent, _) = task_of(&updates).expect("task update");
        assert_eq!(percent, 45);
    }

    #[test]
    fn marker_switches_phase_and_recomputes_overall() {
        let (mut engine, now) = engine();
        let updates = engine.observe_line("Nuitka-Options: standalone mode", now);
        assert_eq!(engine.phase(), Phase::Setup);
        let (overall, _) = overall_of(&updates).expect("overall update");
        // setup spans 10..20, marker task progress 50 -> 15
        assert_eq!(overall, 15);
        let snap = engine.snapshot();
        assert_eq!(snap.task_percent, 50);
    }

    #[test]
    fn task_resets_to_zero_exactly_once_per_phase_change() {
        let (mut engine, now) = engine();
        engine.observe_line("PASS 1: 60.0%| | 6/10, mod_a", now);
        assert_eq!(engine.snapshot().task_percent, 60);

        let updates = engine.observe_line("Packaging application files", now);
        let resets: Vec<_> = updates
            .iter()
            .filter(|u| matches!(u, ProgressUpdate::Task { percent: 0, .. }))
            .collect();
        assert_eq!(resets.len(), 1);
        assert_eq!(engine.phase(), Phase::Packaging);
        // reset then raised to the marker's task progress
        assert_eq!(engine.snapshot().task_percent, 30);

        // same phase again: no further reset
        let updates = engine.observe_line("Packaging application files", now);
        assert!(
            updates
                .iter()
                .all(|u| !matches!(u, ProgressUpdate::Task { percent: 0, .. }))
        );
    }

    #[test]
    fn module_counter_takes_over_when_marker_is_saturated() {
        let (mut engine, now) = engine();
        // First compile line lands via the marker table (phase change).
        engine.observe_line("Compiling module (3 of 10)", now);
        assert_eq!(engine.phase(), Phase::Compiling);
        assert_eq!(engine.snapshot().task_percent, 30);

        // Marker values are now saturated; the counter drives the bar.
        let updates = engine.observe_line("Compiling module (7 of 10)", now);
        let (percent, message) = task_of(&updates).expect("task update");
        assert_eq!(percent, 70);
        assert!(message.contains("7 of 10"));
    }

    #[test]
    fn overall_is_monotonic_across_noisy_input() {
        let (mut engine, now) = engine();
        let lines = [
            "Executable built successfully",
            "Nuitka-Options: late and out of order",
            "Compiling module (1 of 99)",
            "Nuitka:INFO: something",
            "Linking modules",
        ];
        let mut last_overall = 0u8;
        for line in lines {
            for update in engine.observe_line(line, now) {
                if let ProgressUpdate::Overall { percent, .. } = update {
                    assert!(percent >= last_overall, "overall regressed on {line:?}");
                    last_overall = percent;
                }
            }
        }
        assert_eq!(engine.snapshot().overall_percent, 100);
    }

    #[test]
    fn task_percent_never_exceeds_one_hundred() {
        let (mut engine, now) = engine();
        engine.observe_line("PASS 1: 250.0%| | 250/100, runaway", now);
        assert_eq!(engine.snapshot().task_percent, 100);
    }

    #[test]
    fn protocol_update_sets_overall_directly() {
        let (mut engine, now) = engine();
        let updates = engine.apply_protocol(
            &ProtocolUpdate {
                percent: 42,
                message: "Doing the thing".to_string(),
            },
            now,
        );
        assert_eq!(
            overall_of(&updates),
            Some((42, "Doing the thing".to_string()))
        );
        assert_eq!(engine.snapshot().overall_percent, 42);
        assert_eq!(engine.snapshot().overall_message, "Doing the thing");
    }

    #[test]
    fn protocol_update_cannot_regress_overall() {
        let (mut engine, now) = engine();
        engine.apply_protocol(
            &ProtocolUpdate {
                percent: 60,
                message: "ahead".into(),
            },
            now,
        );
        let updates = engine.apply_protocol(
            &ProtocolUpdate {
                percent: 10,
                message: "behind".into(),
            },
            now,
        );
        assert!(updates.is_empty());
        assert_eq!(engine.snapshot().overall_percent, 60);
    }

    #[test]
    fn idle_nudge_fires_after_silence_and_caps_out() {
        let base = Instant::now();
        let mut engine = ProgressEngine::new(base);

        // Inside the idle window: unclassifiable lines change nothing.
        for _ in 0..30 {
            assert!(engine.observe_line("noise", base).is_empty());
        }

        // Past the window the line count drives a capped overall nudge.
        let later = base + Duration::from_secs(6);
        let updates = engine.observe_line("noise", later);
        let (percent, message) = overall_of(&updates).expect("overall nudge");
        assert_eq!(percent, 31); // base 30 + 31 lines / 20
        assert!(message.contains("line"));

        // Flood enough lines that the uncapped value would pass 90.
        let mut clock = later;
        for _ in 0..2000 {
            clock += Duration::from_secs(6);
            engine.observe_line("noise", clock);
        }
        assert_eq!(engine.snapshot().overall_percent, 90);
    }

    #[test]
    fn idle_nudge_never_regresses_overall() {
        let base = Instant::now();
        let mut engine = ProgressEngine::new(base);
        engine.apply_protocol(
            &ProtocolUpdate {
                percent: 80,
                message: "mostly done".into(),
            },
            base,
        );
        let later = base + Duration::from_secs(10);
        let updates = engine.observe_line("noise", later);
        assert!(updates.is_empty());
        assert_eq!(engine.snapshot().overall_percent, 80);
    }
}
