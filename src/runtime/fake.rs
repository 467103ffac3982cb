//! In-memory [`ContainerRuntime`] used by the lifecycle and status tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    ComposeProject, ContainerRuntime, DownRequest, RuntimeError, ServiceState, ServiceStatus, ServiceTarget,
    UpRequest,
};

#[derive(Default)]
pub struct FakeRuntime {
    calls: RefCell<Vec<String>>,
    envs: RefCell<Vec<(String, BTreeMap<String, String>)>>,
    failing_up: HashSet<String>,
    failing_down: HashSet<String>,
    failing_status: HashSet<String>,
    statuses: HashMap<String, Vec<ServiceStatus>>,
    containers: Vec<(String, Option<ComposeProject>)>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_up(mut self, name: &str) -> Self {
        self.failing_up.insert(name.to_string());
        self
    }

    pub fn fail_down(mut self, name: &str) -> Self {
        self.failing_down.insert(name.to_string());
        self
    }

    pub fn fail_status(mut self, key: &str) -> Self {
        self.failing_status.insert(key.to_string());
        self
    }

    /// Status rows returned for a target; `key` is the skill or service name,
    /// or `"project"`.
    pub fn with_status(mut self, key: &str, rows: &[(&str, ServiceState)]) -> Self {
        let rows = rows
            .iter()
            .map(|(name, state)| ServiceStatus {
                name: name.to_string(),
                state: *state,
                container_id: Some(format!("{}-id", name)),
                health: None,
                tier: None,
            })
            .collect();
        self.statuses.insert(key.to_string(), rows);
        self
    }

    pub fn with_container(mut self, id: &str, project: Option<ComposeProject>) -> Self {
        self.containers.push((id.to_string(), project));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Environment passed with the first `up` of `name`.
    pub fn env_for(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.envs
            .borrow()
            .iter()
            .find(|(target, _)| target == name)
            .map(|(_, env)| env.clone())
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

fn key(target: &ServiceTarget) -> String {
    match target {
        ServiceTarget::Skill { name } | ServiceTarget::Service { name, .. } => name.clone(),
        ServiceTarget::Project { .. } => "project".to_string(),
    }
}

fn failure(call: &str) -> RuntimeError {
    RuntimeError::ProcessFailed {
        command: call.to_string(),
        status: "exit code 1".into(),
    }
}

impl ContainerRuntime for FakeRuntime {
    fn bring_up(&self, request: &UpRequest<'_>) -> Result<(), RuntimeError> {
        let name = key(request.target);
        let call = if request.wait {
            format!("up --wait {}", name)
        } else {
            format!("up {}", name)
        };
        self.record(call.clone());
        self.envs.borrow_mut().push((name.clone(), request.env.clone()));
        if self.failing_up.contains(&name) {
            return Err(failure(&call));
        }
        Ok(())
    }

    fn tear_down(&self, request: &DownRequest<'_>) -> Result<(), RuntimeError> {
        let name = key(request.target);
        let call = format!("down {}", name);
        self.record(call.clone());
        if self.failing_down.contains(&name) {
            return Err(failure(&call));
        }
        Ok(())
    }

    fn query_status(&self, target: &ServiceTarget) -> Result<Vec<ServiceStatus>, RuntimeError> {
        let name = key(target);
        let call = format!("ps {}", name);
        self.record(call.clone());
        if self.failing_status.contains(&name) {
            return Err(failure(&call));
        }
        Ok(self.statuses.get(&name).cloned().unwrap_or_default())
    }

    fn running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.containers.iter().map(|(id, _)| id.clone()).collect())
    }

    fn inspect_project(&self, container_id: &str) -> Result<Option<ComposeProject>, RuntimeError> {
        Ok(self
            .containers
            .iter()
            .find(|(id, _)| id == container_id)
            .and_then(|(_, project)| project.clone()))
    }

    fn tear_down_project(&self, project: &ComposeProject) -> Result<(), RuntimeError> {
        let call = format!("down-project {}", project.name);
        self.record(call.clone());
        if self.failing_down.contains(&project.name) {
            return Err(failure(&call));
        }
        Ok(())
    }
}
