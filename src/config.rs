use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cli::ConfigCommand;

const CONFIG_FILE_BASENAMES: [&str; 2] = ["config.toml", "config.yaml"];
const INFRASTRUCTURE_DIR: &str = "infrastructure";
const COMPOSE_FILE_NAMES: [&str; 2] = ["docker-compose.yml", "docker-compose.yaml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtlConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
    #[serde(default)]
    pub exec: ExecSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_project_name")]
    pub project_name: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            project_name: default_project_name(),
        }
    }
}

fn default_program() -> String {
    "docker".into()
}

fn default_project_name() -> String {
    "ws".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            poll_interval_secs: default_poll_interval(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

impl ReadinessSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

fn default_attempts() -> u32 {
    30
}

fn default_poll_interval() -> u64 {
    1
}

fn default_settle_delay() -> u64 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSettings {
    #[serde(default = "default_true")]
    pub bootstrap_ros: bool,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            bootstrap_ros: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Locations of the user settings file. Settings are read, never written.
#[derive(Debug)]
pub struct ConfigManager {
    config_dir: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new() -> Self {
        let config_dir = ProjectDirs::from("com", "karakuri", "karakuri-ctl")
            .map(|dirs| dirs.config_dir().to_path_buf());
        if config_dir.is_none() {
            log::debug!("unable to resolve user config directory, using defaults");
        }
        Self { config_dir }
    }

    pub fn load(&self) -> Result<CtlConfig> {
        let Some(path) = self.config_path() else {
            return Ok(CtlConfig::default());
        };
        if !path.exists() {
            return Ok(CtlConfig::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file at {:?}", path))?;
        parse_config(&path, &contents)
    }

    /// The first existing settings file, or the preferred location when none exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        let dir = self.config_dir.as_ref()?;
        let candidates: Vec<PathBuf> = CONFIG_FILE_BASENAMES.iter().map(|name| dir.join(name)).collect();
        candidates
            .iter()
            .find(|path| path.exists())
            .or_else(|| candidates.last())
            .cloned()
    }
}

fn parse_config(path: &Path, contents: &str) -> Result<CtlConfig> {
    let config = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
        toml::from_str(contents).context("failed to parse TOML config")?
    } else if contents.trim().is_empty() {
        CtlConfig::default()
    } else {
        serde_yaml::from_str(contents).context("failed to parse YAML config")?
    };
    Ok(config)
}

/// Well-known locations inside a project checkout.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_root: PathBuf,
    pub infrastructure_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub skills_catalog: PathBuf,
    pub src_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: PathBuf) -> Self {
        let infrastructure_dir = project_root.join(INFRASTRUCTURE_DIR);
        Self {
            profiles_dir: infrastructure_dir.join("profiles"),
            skills_catalog: infrastructure_dir.join("skills.yaml"),
            src_dir: project_root.join("src"),
            infrastructure_dir,
            project_root,
        }
    }

    /// Resolve the project root from `-C` or by walking up from `start`.
    pub fn discover(directory: Option<&Path>, start: &Path) -> Self {
        let root = match directory {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => start.join(dir),
            None => find_project_root(start),
        };
        Self::new(fs::canonicalize(&root).unwrap_or(root))
    }

    pub fn ensure_infrastructure(&self) -> Result<()> {
        if !self.infrastructure_dir.is_dir() {
            anyhow::bail!(
                "infrastructure directory not found at {:?}",
                self.infrastructure_dir
            );
        }
        Ok(())
    }

    /// `docker-compose.yml` (or `.yaml`) at the project root.
    pub fn default_compose_file(&self) -> PathBuf {
        COMPOSE_FILE_NAMES
            .iter()
            .map(|name| self.project_root.join(name))
            .find(|path| path.exists())
            .unwrap_or_else(|| self.project_root.join(COMPOSE_FILE_NAMES[0]))
    }

    pub fn skill_compose_file(&self, skill: &str) -> Option<PathBuf> {
        COMPOSE_FILE_NAMES
            .iter()
            .map(|name| self.src_dir.join(skill).join(name))
            .find(|path| path.is_file())
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Env files to use for a run: the listed ones (or `.env`), resolved
    /// against the project root. Missing files are skipped with a warning.
    pub fn resolve_env_files(&self, env_files: &[String]) -> Vec<PathBuf> {
        let default = [".env".to_string()];
        let listed = if env_files.is_empty() {
            &default[..]
        } else {
            env_files
        };
        listed
            .iter()
            .filter_map(|file| {
                let path = self.resolve(file);
                if path.is_file() {
                    Some(path)
                } else {
                    if !env_files.is_empty() {
                        log::warn!("env file not found: {}", file);
                    }
                    None
                }
            })
            .collect()
    }
}

fn find_project_root(start: &Path) -> PathBuf {
    for dir in start.ancestors() {
        let has_compose = COMPOSE_FILE_NAMES.iter().any(|name| dir.join(name).exists());
        if has_compose || dir.join(INFRASTRUCTURE_DIR).is_dir() {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

pub fn handle_config(
    command: ConfigCommand,
    manager: &ConfigManager,
    config: &CtlConfig,
    paths: &ProjectPaths,
) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!(
                "{}",
                serde_yaml::to_string(config).context("failed to serialize config for display")?
            );
        }
        ConfigCommand::Paths => {
            match manager.config_path() {
                Some(path) => println!("config: {:?}", path),
                None => println!("config: <unavailable>"),
            }
            println!("project: {:?}", paths.project_root);
            println!("profiles: {:?}", paths.profiles_dir);
            println!("skills: {:?}", paths.skills_catalog);
            println!("compose: {:?}", paths.default_compose_file());
        }
    }
    Ok(())
}
