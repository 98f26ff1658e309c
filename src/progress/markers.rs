//! Ordered marker table mapping known compiler output fragments to
//! phases and task progress. First match wins, so more specific patterns
//! come before the catch-all `Nuitka:INFO:` style entries.

use super::Phase;

/// A textual pattern mapped to a phase / task-progress / message triple.
///
/// `pattern` is matched as a case-insensitive substring and is stored
/// lowercase.
#[derive(Debug, Clone, Copy)]
pub struct MarkerRule {
    pub pattern: &'static str,
    pub phase: Phase,
    pub task_progress: u8,
    pub message: &'static str,
}

pub const MARKER_RULES: &[MarkerRule] = &[
    MarkerRule {
        pattern: "nuitka-options:",
        phase: Phase::Setup,
        task_progress: 50,
        message: "Configuring Nuitka options...",
    },
    MarkerRule {
        pattern: "starting python compilation",
        phase: Phase::Compiling,
        task_progress: 5,
        message: "Starting Python compilation...",
    },
    MarkerRule {
        pattern: "backend c compiler",
        phase: Phase::Compiling,
        task_progress: 25,
        message: "Configuring C compiler...",
    },
    MarkerRule {
        pattern: "c compiler",
        phase: Phase::Compiling,
        task_progress: 15,
        message: "Setting up C compiler...",
    },
    MarkerRule {
        pattern: "compiling",
        phase: Phase::Compiling,
        task_progress: 30,
        message: "Compiling Python modules...",
    },
    MarkerRule {
        pattern: "generating",
        phase: Phase::Compiling,
        task_progress: 50,
        message: "Generating C code...",
    },
    MarkerRule {
        pattern: "building extension modules",
        phase: Phase::Compiling,
        task_progress: 70,
        message: "Building extension modules...",
    },
    MarkerRule {
        pattern: "linking",
        phase: Phase::Compiling,
        task_progress: 85,
        message: "Linking modules...",
    },
    MarkerRule {
        pattern: "packaging",
        phase: Phase::Packaging,
        task_progress: 30,
        message: "Packaging application...",
    },
    MarkerRule {
        pattern: "copying",
        phase: Phase::Packaging,
        task_progress: 70,
        message: "Copying dependencies...",
    },
    MarkerRule {
        pattern: "creating single file",
        phase: Phase::Packaging,
        task_progress: 50,
        message: "Creating single file executable...",
    },
    MarkerRule {
        pattern: "executable built successfully",
        phase: Phase::Finalizing,
        task_progress: 100,
        message: "Build completed successfully!",
    },
    MarkerRule {
        pattern: "nuitka: successfully created",
        phase: Phase::Finalizing,
        task_progress: 100,
        message: "Build completed successfully!",
    },
    MarkerRule {
        pattern: "nuitka:info:",
        phase: Phase::Setup,
        task_progress: 10,
        message: "Nuitka initialization...",
    },
    MarkerRule {
        pattern: "nuitka:warning:",
        phase: Phase::Compiling,
        task_progress: 20,
        message: "Processing warnings...",
    },
    MarkerRule {
        pattern: "used python",
        phase: Phase::Setup,
        task_progress: 30,
        message: "Python environment detected...",
    },
    MarkerRule {
        pattern: "optimization",
        phase: Phase::Compiling,
        task_progress: 60,
        message: "Optimizing code...",
    },
    MarkerRule {
        pattern: "total memory usage",
        phase: Phase::Finalizing,
        task_progress: 90,
        message: "Finalizing build...",
    },
];

/// Case-insensitive first-match lookup against the ordered rule table.
pub fn match_marker(line: &str) -> Option<&'static MarkerRule> {
    let lower = line.to_ascii_lowercase();
    MARKER_RULES.iter().find(|rule| lower.contains(rule.pattern))
}
