//! Build configuration loaded from a YAML document.
//!
//! The schema mirrors what the command builder needs: project metadata,
//! compiler options, files to bundle, and the output location. The
//! `project` and `build` sections are mandatory; everything inside them
//! falls back to sensible defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub project: ProjectConfig,
    pub build: BuildSection,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub copy_beside: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub main_file: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default)]
    pub include: IncludeConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildOptions {
    #[serde(default)]
    pub standalone: bool,
    #[serde(default)]
    pub onefile: bool,
    #[serde(default)]
    pub extra_parameters: Vec<String>,
    #[serde(default)]
    pub splash_screen: Option<String>,
    #[serde(default)]
    pub remove_output: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IncludeConfig {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub data_dirs: Vec<DataDir>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub external_data: Vec<String>,
    #[serde(default)]
    pub distribution_metadata: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataDir {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    pub filename: String,
}

fn default_output_directory() -> String {
    "dist".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl BuildConfig {
    /// Load and validate a configuration file.
    ///
    /// Returns the config together with the project directory (the
    /// directory containing the file), against which all relative paths in
    /// the document are resolved.
    pub fn load(path: &Path) -> Result<(Self, PathBuf)> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve config file path {}", path.display()))?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: BuildConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid build configuration in {}", path.display()))?;
        let project_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((config, project_dir))
    }

    /// Absolute output directory for this configuration.
    pub fn output_dir(&self, project_dir: &Path) -> PathBuf {
        resolve_path(&self.build.output.directory, project_dir)
    }
}

/// Resolve a possibly-relative config path against the project directory.
pub fn resolve_path(raw: &str, project_dir: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
project:
  name: demo
  main_file: main.py
build:
  output:
    filename: demo.exe
"#;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("build.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), MINIMAL);
        let (config, project_dir) = BuildConfig::load(&path).unwrap();

        assert_eq!(config.project.name, "demo");
        assert_eq!(config.build.output.directory, "dist");
        assert!(!config.build.options.onefile);
        assert!(!config.debug.enabled);
        assert!(config.copy_beside.is_empty());
        assert_eq!(project_dir, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn missing_project_section_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "build:\n  output:\n    filename: x.exe\n");
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid build configuration"));
    }

    #[test]
    fn missing_build_section_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "project:\n  name: demo\n  main_file: main.py\n");
        assert!(BuildConfig::load(&path).is_err());
    }

    #[test]
    fn missing_file_is_a_context_rich_error() {
        let err = BuildConfig::load(Path::new("/nonexistent/build.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/build.yaml"));
    }

    #[test]
    fn output_dir_resolves_relative_to_project() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), MINIMAL);
        let (config, project_dir) = BuildConfig::load(&path).unwrap();
        assert_eq!(config.output_dir(&project_dir), project_dir.join("dist"));
    }

    #[test]
    fn full_config_round_trips_all_sections() {
        let dir = tempdir().unwrap();
        let content = r#"
project:
  name: demo
  version: "1.2.3"
  company: Acme
  description: Demo app
  main_file: src/main.py
  icon: assets/icon.ico
build:
  options:
    standalone: true
    onefile: true
    extra_parameters: ["--lto=yes"]
    remove_output: true
  include:
    packages: [requests]
    plugins: [tk-inter]
    data_dirs:
      - source: assets
        target: assets
    files: [README.md]
    distribution_metadata: [requests]
  output:
    directory: out
    filename: demo.exe
debug:
  enabled: true
copy_beside:
  - LICENSE
"#;
        let path = write_config(dir.path(), content);
        let (config, _) = BuildConfig::load(&path).unwrap();
        assert!(config.build.options.standalone);
        assert_eq!(config.build.include.data_dirs[0].target, "assets");
        assert_eq!(config.copy_beside, vec!["LICENSE".to_string()]);
        assert!(config.debug.enabled);
        assert_eq!(config.project.icon.as_deref(), Some("assets/icon.ico"));
    }
}
