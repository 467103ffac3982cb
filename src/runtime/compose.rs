use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::envfile::load_env_file;
use super::status::{ServiceStatus, parse_ps_output};
use super::{ComposeProject, ContainerRuntime, DownRequest, RuntimeError, ServiceTarget, UpRequest};
use crate::config::{ProjectPaths, RuntimeSettings};

const HOST_PROJECT_ROOT: &str = "HOST_PROJECT_ROOT";
const LABEL_SEPARATOR: char = '|';
const PROJECT_LABELS_TEMPLATE: &str = concat!(
    "{{index .Config.Labels \"com.docker.compose.project.config_files\"}}|",
    "{{index .Config.Labels \"com.docker.compose.project.environment_file\"}}|",
    "{{index .Config.Labels \"com.docker.compose.project.working_dir\"}}|",
    "{{index .Config.Labels \"com.docker.compose.project\"}}"
);
const ROS_BOOTSTRAP: [&str; 5] = [
    r#"source "/opt/ros/${ROS_DISTRO:-jazzy}/setup.bash" >/dev/null 2>&1 || true"#,
    "if [ -f /workspace/install/setup.bash ]; then source /workspace/install/setup.bash >/dev/null 2>&1 || true; fi",
    "if [ -f /workspace/install/local_setup.bash ]; then source /workspace/install/local_setup.bash >/dev/null 2>&1 || true; fi",
    "if [ -f /ros2_ws/install/setup.bash ]; then source /ros2_ws/install/setup.bash >/dev/null 2>&1 || true; fi",
    "if [ -f /ros2_ws/install/local_setup.bash ]; then source /ros2_ws/install/local_setup.bash >/dev/null 2>&1 || true; fi",
];

/// One external process call: argv, working directory and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl Invocation {
    fn new(program: &str, cwd: &Path) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.cwd).envs(&self.env);
        command
    }

    /// Run with inherited stdio; non-zero exit is an error.
    fn run(&self) -> Result<(), RuntimeError> {
        let code = self.status()?;
        if code == 0 {
            Ok(())
        } else {
            Err(self.failed(format!("exit code {}", code)))
        }
    }

    /// Run with inherited stdio and return the exit code.
    fn status(&self) -> Result<i32, RuntimeError> {
        log::debug!("running {}", self);
        let status = self.command().status().map_err(|source| self.spawn_error(source))?;
        Ok(status.code().unwrap_or(1))
    }

    /// Run capturing stdout; non-zero exit is an error.
    fn capture(&self) -> Result<String, RuntimeError> {
        log::debug!("capturing {}", self);
        let output = self.command().output().map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!("{}: {}", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, source: std::io::Error) -> RuntimeError {
        RuntimeError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    fn failed(&self, status: String) -> RuntimeError {
        RuntimeError::ProcessFailed {
            command: self.to_string(),
            status,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// `docker compose` backed implementation of [`ContainerRuntime`].
pub struct ComposeRuntime {
    program: String,
    project_name: String,
    paths: ProjectPaths,
}

impl ComposeRuntime {
    pub fn new(settings: &RuntimeSettings, paths: ProjectPaths) -> Self {
        Self {
            program: settings.program.clone(),
            project_name: settings.project_name.clone(),
            paths,
        }
    }

    /// `compose -f ... [-p ...] [--env-file ...] [--profile ...]` for a target.
    pub(crate) fn compose(
        &self,
        target: &ServiceTarget,
        env_files: &[PathBuf],
        compose_profile: Option<&str>,
    ) -> Result<Invocation, RuntimeError> {
        let mut invocation = match target {
            ServiceTarget::Skill { name } => {
                let file = self
                    .paths
                    .skill_compose_file(name)
                    .ok_or_else(|| RuntimeError::ComposeFileNotFound(target.to_string()))?;
                let dir = file.parent().unwrap_or(&self.paths.project_root);
                Invocation::new(&self.program, dir)
                    .arg("compose")
                    .arg("-f")
                    .arg(file.to_string_lossy())
            }
            ServiceTarget::Service { compose_files, .. }
            | ServiceTarget::Project { compose_files } => {
                let mut invocation = Invocation::new(&self.program, &self.paths.project_root).arg("compose");
                for file in self.project_compose_files(compose_files)? {
                    invocation = invocation.arg("-f").arg(file.to_string_lossy());
                }
                invocation.arg("-p").arg(&self.project_name)
            }
        };
        for env_file in env_files {
            invocation = invocation.arg("--env-file").arg(env_file.to_string_lossy());
        }
        if let Some(profile) = compose_profile {
            invocation = invocation.arg("--profile").arg(profile);
        }
        Ok(invocation)
    }

    fn project_compose_files(&self, compose_files: &[String]) -> Result<Vec<PathBuf>, RuntimeError> {
        let mut files = Vec::new();
        for file in compose_files {
            let path = self.paths.resolve(file);
            if path.is_file() {
                files.push(path);
            } else {
                log::warn!("compose file not found: {}", file);
            }
        }
        if files.is_empty() {
            let default = self.paths.default_compose_file();
            if !default.is_file() {
                return Err(RuntimeError::ComposeFileNotFound(format!("{:?}", default)));
            }
            files.push(default);
        }
        Ok(files)
    }

    fn with_env(&self, mut invocation: Invocation, env: &BTreeMap<String, String>) -> Invocation {
        invocation.env = env.clone();
        if !invocation.env.contains_key(HOST_PROJECT_ROOT) && env::var_os(HOST_PROJECT_ROOT).is_none() {
            invocation.env.insert(
                HOST_PROJECT_ROOT.to_string(),
                self.paths.project_root.to_string_lossy().into_owned(),
            );
        }
        invocation
    }

    pub(crate) fn up_invocation(&self, request: &UpRequest<'_>) -> Result<Invocation, RuntimeError> {
        let mut invocation = self
            .compose(request.target, request.env_files, request.compose_profile)?
            .args(["up", "-d"]);
        if request.wait {
            invocation = invocation.arg("--wait");
        }
        if let ServiceTarget::Service { name, .. } = request.target {
            invocation = invocation.arg(name);
        }
        Ok(self.with_env(invocation, request.env))
    }

    pub(crate) fn down_invocation(&self, request: &DownRequest<'_>) -> Result<Invocation, RuntimeError> {
        let invocation = self.compose(request.target, request.env_files, request.compose_profile)?;
        let invocation = match request.target {
            ServiceTarget::Service { name, .. } => invocation.arg("stop").arg(name),
            _ => invocation.arg("down"),
        };
        Ok(self.with_env(invocation, request.env))
    }

    pub(crate) fn project_down_invocation(&self, project: &ComposeProject) -> Invocation {
        let cwd = project
            .working_dir
            .as_deref()
            .filter(|dir| dir.is_dir())
            .unwrap_or(&self.paths.project_root);
        let mut invocation = Invocation::new(&self.program, cwd).arg("compose");
        for file in &project.config_files {
            invocation = invocation.arg("-f").arg(file.to_string_lossy());
        }
        if !project.name.is_empty() {
            invocation = invocation.arg("-p").arg(&project.name);
        }
        for env_file in project.env_files.iter().filter(|file| file.is_file()) {
            invocation = invocation.arg("--env-file").arg(env_file.to_string_lossy());
        }
        invocation.arg("down")
    }

    /// Variables from the project env files; the base environment for calls
    /// that are not driven by a profile.
    fn project_env(&self, env_files: &[PathBuf]) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for file in env_files {
            match load_env_file(file) {
                Ok(values) => env.extend(values),
                Err(err) => log::warn!("failed to read env file {:?}: {}", file, err),
            }
        }
        env
    }

    pub(crate) fn logs_invocation(
        &self,
        target: &ServiceTarget,
        follow: bool,
        tail: u32,
    ) -> Result<Invocation, RuntimeError> {
        let env_files = self.paths.resolve_env_files(&[]);
        let mut invocation = self.compose(target, &[], None)?.arg("logs");
        if follow {
            invocation = invocation.arg("-f");
        }
        invocation = invocation.arg("--tail").arg(tail.to_string());
        if let ServiceTarget::Service { name, .. } = target {
            invocation = invocation.arg(name);
        }
        Ok(self.with_env(invocation, &self.project_env(&env_files)))
    }

    pub(crate) fn status_invocation(&self, target: &ServiceTarget) -> Result<Invocation, RuntimeError> {
        let env_files = self.paths.resolve_env_files(&[]);
        let mut invocation = self
            .compose(target, &env_files, None)?
            .args(["ps", "--format", "json", "-a"]);
        if let ServiceTarget::Service { name, .. } = target {
            invocation = invocation.arg(name);
        }
        Ok(self.with_env(invocation, &self.project_env(&env_files)))
    }

    pub fn logs(&self, target: &ServiceTarget, follow: bool, tail: u32) -> Result<i32, RuntimeError> {
        self.logs_invocation(target, follow, tail)?.status()
    }

    /// Run `command` (or an interactive shell) inside the skill's running
    /// container, returning the child's exit code.
    pub fn exec_skill(
        &self,
        skill: &str,
        command: Option<&[String]>,
        bootstrap_ros: bool,
    ) -> Result<i32, RuntimeError> {
        let compose_file = self
            .paths
            .skill_compose_file(skill)
            .ok_or_else(|| RuntimeError::ComposeFileNotFound(format!("skill '{}'", skill)))?;
        let skill_dir = compose_file.parent().unwrap_or(&self.paths.project_root);
        let Some(container_id) = self.find_skill_container(skill, skill_dir)? else {
            eprintln!(
                "Error: running container not found for skill '{}'. Start it first with 'karakuri-ctl up <profile>'.",
                skill
            );
            return Ok(1);
        };
        let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        exec_invocation(&self.program, &self.paths.project_root, &container_id, command, bootstrap_ros, interactive)
            .status()
    }

    fn find_skill_container(&self, skill: &str, skill_dir: &Path) -> Result<Option<String>, RuntimeError> {
        let service_filter = format!("label=com.docker.compose.service={}", skill);
        let dir_filter = format!("label=com.docker.compose.project.working_dir={}", skill_dir.display());
        let queries = [
            vec!["--filter", service_filter.as_str(), "--filter", dir_filter.as_str()],
            vec!["--filter", service_filter.as_str()],
        ];
        for filters in queries {
            let invocation = Invocation::new(&self.program, &self.paths.project_root)
                .arg("ps")
                .args(filters)
                .args(["--format", "{{.ID}}"]);
            match invocation.capture() {
                Ok(output) => {
                    if let Some(id) = output.lines().map(str::trim).find(|line| !line.is_empty()) {
                        return Ok(Some(id.to_string()));
                    }
                }
                Err(err @ RuntimeError::Spawn { .. }) => return Err(err),
                Err(err) => log::debug!("container lookup failed: {}", err),
            }
        }
        Ok(None)
    }
}

impl ContainerRuntime for ComposeRuntime {
    fn bring_up(&self, request: &UpRequest<'_>) -> Result<(), RuntimeError> {
        self.up_invocation(request)?.run()
    }

    fn tear_down(&self, request: &DownRequest<'_>) -> Result<(), RuntimeError> {
        self.down_invocation(request)?.run()
    }

    fn query_status(&self, target: &ServiceTarget) -> Result<Vec<ServiceStatus>, RuntimeError> {
        let output = self.status_invocation(target)?.capture()?;
        parse_ps_output(&output)
    }

    fn running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        let output = Invocation::new(&self.program, &self.paths.project_root)
            .args(["ps", "--format", "{{.ID}}"])
            .capture()?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn inspect_project(&self, container_id: &str) -> Result<Option<ComposeProject>, RuntimeError> {
        let output = Invocation::new(&self.program, &self.paths.project_root)
            .args(["inspect", container_id, "--format", PROJECT_LABELS_TEMPLATE])
            .capture()?;
        Ok(parse_project_labels(&output))
    }

    fn tear_down_project(&self, project: &ComposeProject) -> Result<(), RuntimeError> {
        self.project_down_invocation(project).run()
    }
}

/// Parse the `|`-separated label line produced by [`PROJECT_LABELS_TEMPLATE`].
fn parse_project_labels(output: &str) -> Option<ComposeProject> {
    let parts: Vec<&str> = output.trim().split(LABEL_SEPARATOR).collect();
    if parts.len() < 4 || parts[0].trim().is_empty() {
        return None;
    }
    let split_paths = |raw: &str| -> Vec<PathBuf> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(PathBuf::from)
            .collect()
    };
    let working_dir = parts[2].trim();
    Some(ComposeProject {
        config_files: split_paths(parts[0]),
        env_files: split_paths(parts[1]),
        working_dir: (!working_dir.is_empty()).then(|| PathBuf::from(working_dir)),
        name: parts[3].trim().to_string(),
    })
}

fn exec_invocation(
    program: &str,
    cwd: &Path,
    container_id: &str,
    command: Option<&[String]>,
    bootstrap_ros: bool,
    interactive: bool,
) -> Invocation {
    let mut script: Vec<String> = Vec::new();
    if bootstrap_ros {
        script.extend(ROS_BOOTSTRAP.iter().map(|line| line.to_string()));
    }
    match command {
        Some(tokens) => script.push(
            tokens
                .iter()
                .map(|token| shell_quote(token))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        None => script.push("exec bash -i".to_string()),
    }
    let mut invocation = Invocation::new(program, cwd).arg("exec");
    if interactive {
        invocation = invocation.arg("-it");
    }
    invocation.arg(container_id).args(["bash", "-lc"]).arg(script.join("\n"))
}

/// Quote `arg` for a POSIX shell when it contains anything beyond a safe set.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}
