//! Narrow capability interface over the external container runtime, plus
//! the `docker compose` backed implementation used by the CLI.

mod compose;
mod envfile;
#[cfg(test)]
pub mod fake;
mod status;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use thiserror::Error;

use crate::cli::{ExecArgs, LogsArgs};
use crate::config::{CtlConfig, ProjectPaths};
use crate::profile::{Profile, ProfileKind, ServiceConfig};

pub use compose::ComposeRuntime;
pub use envfile::load_env_file;
pub use status::{ServiceState, ServiceStatus};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("compose file not found for {0}")]
    ComposeFileNotFound(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with {status}")]
    ProcessFailed { command: String, status: String },
    #[error("failed to parse runtime output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What a runtime call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceTarget {
    /// A skill with its own compose file under `src/<name>/`.
    Skill { name: String },
    /// One service of the project compose files.
    Service {
        name: String,
        compose_files: Vec<String>,
    },
    /// Every service of the project compose files.
    Project { compose_files: Vec<String> },
}

impl ServiceTarget {
    pub fn for_service(profile: &Profile, service: &ServiceConfig) -> Self {
        match profile.kind {
            ProfileKind::Skills => ServiceTarget::Skill {
                name: service.name.clone(),
            },
            ProfileKind::Services => ServiceTarget::Service {
                name: service.name.clone(),
                compose_files: profile.compose_files.clone(),
            },
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTarget::Skill { name } => write!(f, "skill '{}'", name),
            ServiceTarget::Service { name, .. } => write!(f, "service '{}'", name),
            ServiceTarget::Project { .. } => f.write_str("project"),
        }
    }
}

pub struct UpRequest<'a> {
    pub target: &'a ServiceTarget,
    pub env: &'a BTreeMap<String, String>,
    pub env_files: &'a [PathBuf],
    pub compose_profile: Option<&'a str>,
    /// Ask the runtime to block until the service reports healthy.
    pub wait: bool,
}

pub struct DownRequest<'a> {
    pub target: &'a ServiceTarget,
    pub env: &'a BTreeMap<String, String>,
    pub env_files: &'a [PathBuf],
    pub compose_profile: Option<&'a str>,
}

/// A compose project discovered from a running container's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: String,
    pub config_files: Vec<PathBuf>,
    pub env_files: Vec<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

pub trait ContainerRuntime {
    fn bring_up(&self, request: &UpRequest<'_>) -> Result<(), RuntimeError>;

    fn tear_down(&self, request: &DownRequest<'_>) -> Result<(), RuntimeError>;

    fn query_status(&self, target: &ServiceTarget) -> Result<Vec<ServiceStatus>, RuntimeError>;

    /// IDs of every running container visible to the runtime.
    fn running_containers(&self) -> Result<Vec<String>, RuntimeError>;

    /// Compose metadata attached to a container, `None` when it has none.
    fn inspect_project(&self, container_id: &str) -> Result<Option<ComposeProject>, RuntimeError>;

    fn tear_down_project(&self, project: &ComposeProject) -> Result<(), RuntimeError>;
}

pub fn handle_logs(args: LogsArgs, config: &CtlConfig, paths: &ProjectPaths) -> Result<ExitCode> {
    let runtime = ComposeRuntime::new(&config.runtime, paths.clone());
    let target = if paths.skill_compose_file(&args.service).is_some() {
        ServiceTarget::Skill {
            name: args.service.clone(),
        }
    } else {
        ServiceTarget::Service {
            name: args.service.clone(),
            compose_files: Vec::new(),
        }
    };
    log::debug!("showing logs for {}", target);
    let code = runtime.logs(&target, args.follow, args.tail)?;
    Ok(exit_code(code))
}

pub fn handle_exec(args: ExecArgs, config: &CtlConfig, paths: &ProjectPaths) -> Result<ExitCode> {
    let runtime = ComposeRuntime::new(&config.runtime, paths.clone());
    let command = if args.command.is_empty() {
        None
    } else {
        Some(args.command.as_slice())
    };
    let code = runtime.exec_skill(&args.skill, command, config.exec.bootstrap_ros)?;
    Ok(exit_code(code))
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
