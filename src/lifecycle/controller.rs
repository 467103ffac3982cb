use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::LifecycleError;
use super::env::{layered, load_env_files};
use crate::config::ReadinessSettings;
use crate::profile::{Profile, start_order, stop_order};
use crate::runtime::{
    ComposeProject, ContainerRuntime, DownRequest, ServiceState, ServiceTarget, UpRequest,
};

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    /// Status polls made for a service that does not use the runtime's own wait.
    pub attempts: u32,
    pub poll_interval: Duration,
    /// Pause after starting a service that has dependencies.
    pub settle_delay: Duration,
}

impl From<&ReadinessSettings> for LifecycleSettings {
    fn from(settings: &ReadinessSettings) -> Self {
        Self {
            attempts: settings.attempts,
            poll_interval: settings.poll_interval(),
            settle_delay: settings.settle_delay(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StartReport {
    pub started: Vec<String>,
    /// The service whose start aborted the sequence.
    pub failed: Option<String>,
}

impl StartReport {
    pub fn success(&self) -> bool {
        self.failed.is_none()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub failed: Vec<String>,
}

impl StopReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives a [`ContainerRuntime`] through a profile's services in dependency order.
pub struct LifecycleController<'a, R: ContainerRuntime> {
    runtime: &'a R,
    settings: LifecycleSettings,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a, R: ContainerRuntime> LifecycleController<'a, R> {
    pub fn new(runtime: &'a R, settings: LifecycleSettings) -> Self {
        Self {
            runtime,
            settings,
            sleep: Box::new(thread::sleep),
        }
    }

    /// Replace the blocking sleep used between readiness polls and after
    /// dependent services.
    #[cfg(test)]
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Start every service in dependency order, stopping at the first failure.
    /// Services started before the failure are left running.
    pub fn start(
        &self,
        profile: &Profile,
        global_env: &BTreeMap<String, String>,
        env_files: &[PathBuf],
    ) -> Result<StartReport, LifecycleError> {
        let ordered = start_order(&profile.services)?;
        let file_env = load_env_files(env_files)?;
        let mut report = StartReport::default();

        for service in &ordered {
            let target = ServiceTarget::for_service(profile, service);
            let env = layered(&[&file_env, global_env, &service.environment]);
            log::info!("starting {}", target);
            let request = UpRequest {
                target: &target,
                env: &env,
                env_files,
                compose_profile: service.compose_profile.as_deref(),
                wait: service.wait_for_healthy,
            };
            if let Err(err) = self.runtime.bring_up(&request) {
                println!("  FAILED {}: {}", service.name, err);
                report.failed = Some(service.name.clone());
                return Ok(report);
            }
            if !service.wait_for_healthy && !self.wait_until_running(&target) {
                log::warn!(
                    "{} did not report running after {} checks, continuing",
                    target,
                    self.settings.attempts
                );
            }
            println!("  OK     {}", service.name);
            report.started.push(service.name.clone());

            if !service.depends_on.is_empty() && !self.settings.settle_delay.is_zero() {
                log::debug!("settling for {:?} after {}", self.settings.settle_delay, service.name);
                (self.sleep)(self.settings.settle_delay);
            }
        }
        Ok(report)
    }

    /// Tear services down in reverse dependency order. Failures are recorded
    /// and the remaining services are still stopped.
    pub fn stop(
        &self,
        profile: &Profile,
        global_env: &BTreeMap<String, String>,
        env_files: &[PathBuf],
    ) -> Result<StopReport, LifecycleError> {
        let ordered = stop_order(&profile.services)?;
        let file_env = load_env_files(env_files)?;
        let mut report = StopReport::default();

        for service in &ordered {
            let target = ServiceTarget::for_service(profile, service);
            let env = layered(&[&file_env, global_env, &service.environment]);
            log::info!("stopping {}", target);
            let request = DownRequest {
                target: &target,
                env: &env,
                env_files,
                compose_profile: service.compose_profile.as_deref(),
            };
            match self.runtime.tear_down(&request) {
                Ok(()) => {
                    println!("  OK     {}", service.name);
                    report.stopped.push(service.name.clone());
                }
                Err(err) => {
                    println!("  FAILED {}: {}", service.name, err);
                    report.failed.push(service.name.clone());
                }
            }
        }
        Ok(report)
    }

    /// Tear down every running compose project whose files live under
    /// `project_root`. Projects from elsewhere are left alone.
    pub fn stop_all(&self, project_root: &Path) -> bool {
        let containers = match self.runtime.running_containers() {
            Ok(containers) => containers,
            Err(err) => {
                println!("  FAILED listing running containers: {}", err);
                return false;
            }
        };
        if containers.is_empty() {
            println!("No running containers found.");
            return true;
        }

        let projects = self.group_projects(&containers, project_root);
        if projects.is_empty() {
            log::info!("no compose projects under {:?}, stopping default project", project_root);
            let target = ServiceTarget::Project {
                compose_files: Vec::new(),
            };
            let env = BTreeMap::new();
            let request = DownRequest {
                target: &target,
                env: &env,
                env_files: &[],
                compose_profile: None,
            };
            return match self.runtime.tear_down(&request) {
                Ok(()) => true,
                Err(err) => {
                    println!("  FAILED default project: {}", err);
                    false
                }
            };
        }

        let mut success = true;
        for project in projects.values() {
            println!(
                "  Stopping project: {} ({})",
                project.name,
                display_files(&project.config_files)
            );
            if let Err(err) = self.runtime.tear_down_project(project) {
                println!("  FAILED {}: {}", project.name, err);
                success = false;
            }
        }
        success
    }

    /// One entry per distinct set of compose files, restricted to the project.
    fn group_projects(&self, containers: &[String], project_root: &Path) -> BTreeMap<String, ComposeProject> {
        let mut projects = BTreeMap::new();
        for id in containers {
            let project = match self.runtime.inspect_project(id) {
                Ok(Some(project)) => project,
                Ok(None) => continue,
                Err(err) => {
                    log::debug!("skipping container {}: {}", id, err);
                    continue;
                }
            };
            let inside = !project.config_files.is_empty()
                && project
                    .config_files
                    .iter()
                    .all(|file| file.starts_with(project_root));
            if !inside {
                log::debug!("container {} belongs to another project, leaving it", id);
                continue;
            }
            projects
                .entry(display_files(&project.config_files))
                .or_insert(project);
        }
        projects
    }

    /// Poll status until some container of the target is running.
    fn wait_until_running(&self, target: &ServiceTarget) -> bool {
        for attempt in 1..=self.settings.attempts {
            match self.runtime.query_status(target) {
                Ok(statuses) if statuses.iter().any(|status| status.state == ServiceState::Running) => {
                    return true;
                }
                Ok(_) => log::debug!("{} not running yet (check {})", target, attempt),
                Err(err) => log::debug!("status check for {} failed: {}", target, err),
            }
            if attempt < self.settings.attempts {
                (self.sleep)(self.settings.poll_interval);
            }
        }
        false
    }
}

fn display_files(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|file| file.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileKind, ServiceConfig};
    use crate::runtime::fake::FakeRuntime;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    fn settings() -> LifecycleSettings {
        LifecycleSettings {
            attempts: 3,
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }

    fn profile(kind: ProfileKind, services: Vec<ServiceConfig>) -> Profile {
        Profile {
            name: "test".into(),
            description: String::new(),
            kind,
            services,
            environment: BTreeMap::new(),
            compose_files: Vec::new(),
            env_files: Vec::new(),
            ros: None,
        }
    }

    fn waiting(name: &str) -> ServiceConfig {
        let mut service = ServiceConfig::new(name);
        service.wait_for_healthy = true;
        service
    }

    fn abc() -> Profile {
        profile(
            ProfileKind::Skills,
            vec![waiting("a"), waiting("b"), waiting("c")],
        )
    }

    #[test]
    fn start_follows_dependency_order() {
        let runtime = FakeRuntime::new();
        let controller = LifecycleController::new(&runtime, settings());
        let profile = profile(
            ProfileKind::Skills,
            vec![waiting("a").depends_on(&["b"]), waiting("b")],
        );
        let report = controller.start(&profile, &BTreeMap::new(), &[]).unwrap();
        assert!(report.success());
        assert_eq!(report.started, vec!["b", "a"]);
        assert_eq!(runtime.calls(), vec!["up --wait b", "up --wait a"]);
    }

    #[test]
    fn start_aborts_on_first_failure_without_rollback() {
        let runtime = FakeRuntime::new().fail_up("b");
        let controller = LifecycleController::new(&runtime, settings());
        let report = controller.start(&abc(), &BTreeMap::new(), &[]).unwrap();
        assert!(!report.success());
        assert_eq!(report.started, vec!["a"]);
        assert_eq!(report.failed.as_deref(), Some("b"));
        assert_eq!(runtime.calls(), vec!["up --wait a", "up --wait b"]);
    }

    #[test]
    fn stop_runs_in_reverse_and_continues_past_failure() {
        let runtime = FakeRuntime::new().fail_down("b");
        let controller = LifecycleController::new(&runtime, settings());
        let report = controller.stop(&abc(), &BTreeMap::new(), &[]).unwrap();
        assert!(!report.success());
        assert_eq!(report.stopped, vec!["c", "a"]);
        assert_eq!(report.failed, vec!["b"]);
        assert_eq!(runtime.calls(), vec!["down c", "down b", "down a"]);
    }

    #[test]
    fn stop_order_reverses_start_order() {
        let runtime = FakeRuntime::new();
        let controller = LifecycleController::new(&runtime, settings());
        let profile = profile(
            ProfileKind::Skills,
            vec![
                waiting("planner").depends_on(&["driver", "map"]),
                waiting("map").depends_on(&["driver"]),
                waiting("driver"),
            ],
        );
        let started = controller.start(&profile, &BTreeMap::new(), &[]).unwrap().started;
        let mut stopped = controller.stop(&profile, &BTreeMap::new(), &[]).unwrap().stopped;
        stopped.reverse();
        assert_eq!(started, stopped);
    }

    #[test]
    fn environment_layers_env_files_then_global_then_service() {
        let dir = TempDir::new().unwrap();
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "X=1\nFROM_FILE=yes\n").unwrap();
        let mut a = waiting("a");
        a.environment.insert("X".into(), "3".into());
        let profile = profile(ProfileKind::Skills, vec![a, waiting("b")]);
        let global = BTreeMap::from([("X".to_string(), "2".to_string())]);

        let runtime = FakeRuntime::new();
        let controller = LifecycleController::new(&runtime, settings());
        controller.start(&profile, &global, &[env_file]).unwrap();

        let a_env = runtime.env_for("a").unwrap();
        let b_env = runtime.env_for("b").unwrap();
        assert_eq!(a_env["X"], "3");
        assert_eq!(b_env["X"], "2");
        assert_eq!(b_env["FROM_FILE"], "yes");
    }

    #[test]
    fn readiness_polls_until_running() {
        let runtime = FakeRuntime::new().with_status("db", &[("db", ServiceState::Running)]);
        let controller = LifecycleController::new(&runtime, settings());
        let profile = profile(ProfileKind::Services, vec![ServiceConfig::new("db")]);
        let report = controller.start(&profile, &BTreeMap::new(), &[]).unwrap();
        assert!(report.success());
        assert_eq!(runtime.calls(), vec!["up db", "ps db"]);
    }

    #[test]
    fn readiness_timeout_is_not_fatal() {
        let runtime = FakeRuntime::new()
            .with_status("db", &[("db", ServiceState::Exited)])
            .fail_status("cache");
        let controller = LifecycleController::new(&runtime, settings());
        let profile = profile(
            ProfileKind::Services,
            vec![ServiceConfig::new("db"), ServiceConfig::new("cache")],
        );
        let report = controller.start(&profile, &BTreeMap::new(), &[]).unwrap();
        assert!(report.success());
        assert_eq!(report.started, vec!["db", "cache"]);
        let polls = runtime.calls().iter().filter(|call| call.starts_with("ps ")).count();
        assert_eq!(polls, 6);
    }

    #[test]
    fn settle_delay_follows_only_services_with_dependencies() {
        let runtime = FakeRuntime::new();
        let slept = RefCell::new(Vec::new());
        let controller = LifecycleController::new(
            &runtime,
            LifecycleSettings {
                attempts: 3,
                poll_interval: Duration::from_secs(1),
                settle_delay: Duration::from_secs(2),
            },
        )
        .with_sleep(|duration| slept.borrow_mut().push((runtime.calls().last().cloned(), duration)));
        let profile = profile(
            ProfileKind::Skills,
            vec![
                waiting("driver"),
                waiting("map").depends_on(&["driver"]),
                waiting("viz"),
            ],
        );
        controller.start(&profile, &BTreeMap::new(), &[]).unwrap();
        assert_eq!(
            *slept.borrow(),
            vec![(Some("up --wait map".to_string()), Duration::from_secs(2))]
        );
    }

    #[test]
    fn readiness_polls_are_spaced_by_poll_interval() {
        let runtime = FakeRuntime::new().with_status("db", &[("db", ServiceState::Exited)]);
        let slept = RefCell::new(Vec::new());
        let controller = LifecycleController::new(
            &runtime,
            LifecycleSettings {
                attempts: 3,
                poll_interval: Duration::from_secs(1),
                settle_delay: Duration::from_secs(2),
            },
        )
        .with_sleep(|duration| slept.borrow_mut().push(duration));
        let profile = profile(ProfileKind::Services, vec![ServiceConfig::new("db")]);
        controller.start(&profile, &BTreeMap::new(), &[]).unwrap();
        assert_eq!(*slept.borrow(), vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn cycle_is_rejected_before_anything_starts() {
        let runtime = FakeRuntime::new();
        let controller = LifecycleController::new(&runtime, settings());
        let profile = profile(
            ProfileKind::Skills,
            vec![waiting("a").depends_on(&["b"]), waiting("b").depends_on(&["a"])],
        );
        let err = controller.start(&profile, &BTreeMap::new(), &[]).unwrap_err();
        assert!(matches!(err, LifecycleError::Order(_)));
        assert!(runtime.calls().is_empty());
    }

    fn compose_project(name: &str, file: &Path) -> ComposeProject {
        ComposeProject {
            name: name.into(),
            config_files: vec![file.to_path_buf()],
            env_files: Vec::new(),
            working_dir: file.parent().map(Path::to_path_buf),
        }
    }

    #[test]
    fn stop_all_only_touches_projects_under_the_root() {
        let root = Path::new("/work/robot");
        let runtime = FakeRuntime::new()
            .with_container("c1", Some(compose_project("lidar", &root.join("src/lidar/docker-compose.yml"))))
            .with_container("c2", Some(compose_project("lidar", &root.join("src/lidar/docker-compose.yml"))))
            .with_container("c3", Some(compose_project("other", Path::new("/elsewhere/docker-compose.yml"))))
            .with_container("c4", None)
            .with_container("c5", Some(compose_project("arm", &root.join("src/arm/docker-compose.yml"))));
        let controller = LifecycleController::new(&runtime, settings());
        assert!(controller.stop_all(root));
        assert_eq!(runtime.calls(), vec!["down-project arm", "down-project lidar"]);
    }

    #[test]
    fn stop_all_continues_past_failures() {
        let root = Path::new("/work/robot");
        let runtime = FakeRuntime::new()
            .with_container("c1", Some(compose_project("arm", &root.join("src/arm/docker-compose.yml"))))
            .with_container("c2", Some(compose_project("lidar", &root.join("src/lidar/docker-compose.yml"))))
            .fail_down("arm");
        let controller = LifecycleController::new(&runtime, settings());
        assert!(!controller.stop_all(root));
        assert_eq!(runtime.calls(), vec!["down-project arm", "down-project lidar"]);
    }

    #[test]
    fn stop_all_falls_back_to_default_project() {
        let runtime = FakeRuntime::new()
            .with_container("c1", Some(compose_project("other", Path::new("/elsewhere/docker-compose.yml"))));
        let controller = LifecycleController::new(&runtime, settings());
        assert!(controller.stop_all(Path::new("/work/robot")));
        assert_eq!(runtime.calls(), vec!["down project"]);
    }

    #[test]
    fn stop_all_with_nothing_running_succeeds() {
        let runtime = FakeRuntime::new();
        let controller = LifecycleController::new(&runtime, settings());
        assert!(controller.stop_all(Path::new("/work/robot")));
        assert!(runtime.calls().is_empty());
    }
}
