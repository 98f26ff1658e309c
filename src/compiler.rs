//! Nuitka command construction.
//!
//! Turns the build configuration into the argument vector, working
//! directory, and environment the launcher consumes. The supervisor never
//! looks inside any of this; it treats the compiler as an opaque
//! long-running CLI process.

use crate::config::{BuildConfig, resolve_path};
use crate::supervisor::{LaunchSpec, Transport};
use std::path::Path;
use tracing::debug;

/// Locate the Python interpreter that should run Nuitka.
///
/// Preference order: the active virtual environment, a `.venv`/`venv`/`env`
/// directory beside (or one level above) the project, then whatever
/// `python3` resolves to on PATH.
pub fn find_interpreter(project_dir: &Path) -> String {
    let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
    let python = if cfg!(windows) { "python.exe" } else { "python" };

    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        return Path::new(&venv)
            .join(bin_dir)
            .join(python)
            .to_string_lossy()
            .into_owned();
    }

    for venv_dir in [".venv", "venv", "env"] {
        for base in [Some(project_dir), project_dir.parent()].into_iter().flatten() {
            let candidate = base.join(venv_dir).join(bin_dir).join(python);
            if candidate.exists() {
                return candidate.to_string_lossy().into_owned();
            }
        }
    }

    if cfg!(windows) { "python".to_string() } else { "python3".to_string() }
}

/// Build the full launch specification for a compile run.
pub fn build_launch_spec(
    config: &BuildConfig,
    project_dir: &Path,
    transport: Transport,
) -> LaunchSpec {
    let program = find_interpreter(project_dir);
    let args = build_args(config, project_dir);
    debug!(%program, args = args.len(), "assembled compiler command");
    LaunchSpec {
        program,
        args,
        cwd: project_dir.to_path_buf(),
        // Keeps the compiler's own progress rendering to one line at a time
        // even when it thinks it has a terminal.
        env: vec![("NUITKA_PLAIN_PROGRESS".to_string(), "1".to_string())],
        transport,
    }
}

/// Construct the Nuitka argument vector from the configuration.
pub fn build_args(config: &BuildConfig, project_dir: &Path) -> Vec<String> {
    let project = &config.project;
    let build = &config.build;

    let main_file = resolve_path(&project.main_file, project_dir);
    let mut args = vec![
        "-m".to_string(),
        "nuitka".to_string(),
        main_file.to_string_lossy().into_owned(),
    ];

    if build.options.standalone {
        args.push("--standalone".to_string());
    }
    if build.options.onefile {
        args.push("--onefile".to_string());
    }
    args.extend(build.options.extra_parameters.iter().cloned());

    if let Some(icon) = &project.icon {
        let icon = resolve_path(icon, project_dir);
        args.push(format!("--windows-icon-from-ico={}", icon.display()));
    }
    args.push(format!("--company-name={}", project.company));
    args.push(format!("--product-name={}", project.name));
    args.push(format!("--product-version={}", project.version));
    args.push(format!("--file-description={}", project.description));

    if cfg!(windows)
        && let Some(splash) = &build.options.splash_screen
    {
        let splash = resolve_path(splash, project_dir);
        args.push(format!(
            "--onefile-windows-splash-screen-image={}",
            splash.display()
        ));
    }

    for meta in &build.include.distribution_metadata {
        args.push(format!("--include-distribution-metadata={meta}"));
    }

    for package in &build.include.packages {
        args.push(format!("--include-package={package}"));
        if package == "PySide6" {
            args.push("--enable-plugin=pyside6".to_string());
        }
    }
    for plugin in &build.include.plugins {
        args.push(format!("--enable-plugin={plugin}"));
    }

    for data_dir in &build.include.data_dirs {
        let source = resolve_path(&data_dir.source, project_dir);
        args.push(format!(
            "--include-data-dir={}={}",
            source.display(),
            data_dir.target
        ));
    }
    for data in &build.include.external_data {
        args.push(format!("--include-onefile-external-data={data}"));
    }
    if build.options.remove_output {
        args.push("--remove-output".to_string());
    }
    for file in &build.include.files {
        let path = Path::new(file);
        if path.is_absolute() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            args.push(format!("--include-data-file={file}={name}"));
        } else {
            let absolute = resolve_path(file, project_dir);
            args.push(format!("--include-data-file={}={file}", absolute.display()));
        }
    }

    // Nuitka appends .exe itself on Windows; strip it elsewhere.
    let filename = &build.output.filename;
    let filename = if cfg!(windows) {
        filename.clone()
    } else {
        filename
            .strip_suffix(".exe")
            .map(str::to_string)
            .unwrap_or_else(|| filename.clone())
    };
    let output_dir = config.output_dir(project_dir);
    args.push(format!("--output-dir={}", output_dir.display()));
    args.push(format!("--output-filename={filename}"));

    // Debug redirection changes what the child writes, not what we parse.
    if config.debug.enabled {
        args.push("--windows-console-mode=force".to_string());
        args.push("--force-stdout-spec={PROGRAM_BASE}.out.txt".to_string());
        args.push("--force-stderr-spec={PROGRAM_BASE}.err.txt".to_string());
    } else {
        args.push("--windows-console-mode=disable".to_string());
    }

    args
}
