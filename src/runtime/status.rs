use std::fmt;

use serde::{Deserialize, Serialize};

use super::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Exited,
    Created,
    Restarting,
    Paused,
    Dead,
    NotFound,
}

impl ServiceState {
    /// Map a runtime state string; anything unrecognised becomes `NotFound`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => ServiceState::Running,
            "exited" => ServiceState::Exited,
            "created" => ServiceState::Created,
            "restarting" => ServiceState::Restarting,
            "paused" => ServiceState::Paused,
            "dead" => ServiceState::Dead,
            _ => ServiceState::NotFound,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Exited => "exited",
            ServiceState::Created => "created",
            ServiceState::Restarting => "restarting",
            ServiceState::Paused => "paused",
            ServiceState::Dead => "dead",
            ServiceState::NotFound => "not started",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl ServiceStatus {
    pub fn short_id(&self) -> &str {
        match &self.container_id {
            Some(id) => id.get(..12).unwrap_or(id),
            None => "-",
        }
    }
}

/// One entry of `compose ps --format json`.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Service", default)]
    service: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "ID", default)]
    id: Option<String>,
    #[serde(rename = "Health", default)]
    health: Option<String>,
}

impl From<PsEntry> for ServiceStatus {
    fn from(entry: PsEntry) -> Self {
        Self {
            name: entry.service.unwrap_or_else(|| "unknown".into()),
            state: entry
                .state
                .as_deref()
                .map(ServiceState::parse)
                .unwrap_or(ServiceState::NotFound),
            container_id: entry.id.filter(|id| !id.is_empty()),
            health: entry.health.filter(|health| !health.is_empty()),
            tier: None,
        }
    }
}

/// Parse `ps` output, either one JSON object per line or a single JSON array.
pub fn parse_ps_output(output: &str) -> Result<Vec<ServiceStatus>, RuntimeError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<PsEntry>)
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(entries.into_iter().map(ServiceStatus::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_lines() {
        let output = r#"{"ID":"0123456789abcdef","Service":"driver","State":"running","Health":"healthy"}
{"ID":"fedcba","Service":"planner","State":"exited","Health":""}
"#;
        let statuses = parse_ps_output(output).unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "driver");
        assert_eq!(statuses[0].state, ServiceState::Running);
        assert_eq!(statuses[0].short_id(), "0123456789ab");
        assert_eq!(statuses[0].health.as_deref(), Some("healthy"));
        assert_eq!(statuses[1].state, ServiceState::Exited);
        assert_eq!(statuses[1].health, None);
    }

    #[test]
    fn parses_json_array() {
        let output = r#"[{"ID":"a1","Service":"db","State":"Paused"}]"#;
        let statuses = parse_ps_output(output).unwrap();
        assert_eq!(statuses[0].state, ServiceState::Paused);
    }

    #[test]
    fn unknown_or_missing_state_maps_to_not_found() {
        let output = "{\"Service\":\"a\",\"State\":\"removing\"}\n{\"Service\":\"b\"}\n";
        let statuses = parse_ps_output(output).unwrap();
        assert!(statuses.iter().all(|s| s.state == ServiceState::NotFound));
        assert_eq!(statuses[1].short_id(), "-");
    }

    #[test]
    fn empty_output_is_no_services() {
        assert!(parse_ps_output("\n").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_ps_output("not json").is_err());
    }
}
