//! The `build` subcommand: load the configuration, launch the compiler
//! under the supervisor, and run the post-build copy stage on success.

use anyhow::{Context, Result};
use console::style;
use packsmith::compiler;
use packsmith::config::{BuildConfig, resolve_path};
use packsmith::supervisor::{
    BuildOutcome, BuildSession, CancellationController, Transport, launch, supervise,
};
use packsmith::ui::BuildUi;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn cmd_build(config_path: &Path, transport: Transport, echo_output: bool) -> Result<BuildOutcome> {
    let (config, project_dir) = BuildConfig::load(config_path)?;

    let output_dir = config.output_dir(&project_dir);
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;

    let spec = compiler::build_launch_spec(&config, &project_dir, transport);
    println!(
        "{} {} {}",
        style("Building").green().bold(),
        config.project.name,
        style(format!("({} {})", spec.program, spec.args.join(" "))).dim()
    );

    let session = Arc::new(BuildSession::new());

    // The interrupt handler needs the same session the launcher registers
    // into; it observes the child, it never owns it.
    let controller = CancellationController::new(session.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            controller.cancel().await;
        }
    });

    let child = launch(&spec, &session).await?;
    info!(pid = child.id(), "compiler started");

    let ui = BuildUi::new(echo_output);
    let (mut display, mut progress) = ui.sinks();
    let outcome = supervise(child, &session, &mut display, &mut progress).await;
    ui.finish(&outcome);

    // Later stages only run after a clean compile.
    if outcome.success() {
        copy_beside(&config, &project_dir, &output_dir)?;
    }
    Ok(outcome)
}

/// Copy the configured extra files and directories next to the executable.
///
/// Missing sources are warnings, not failures: the executable already
/// built, and the operator can fix the manifest without recompiling.
fn copy_beside(config: &BuildConfig, project_dir: &Path, output_dir: &Path) -> Result<()> {
    for item in &config.copy_beside {
        let source = resolve_path(item, project_dir);
        let dest = output_dir.join(item);
        if !source.exists() {
            warn!(item = %item, "copy_beside source not found, skipping");
            continue;
        }
        if source.is_dir() {
            copy_dir(&source, &dest)
                .with_context(|| format!("Failed to copy directory {item}"))?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for {item}"))?;
            }
            std::fs::copy(&source, &dest).with_context(|| format!("Failed to copy {item}"))?;
        }
        info!(item = %item, "copied beside executable");
    }
    Ok(())
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(source) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields paths under its root");
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
