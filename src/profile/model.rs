use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::document::stringify;

const DEFAULT_DOMAIN_ID: &str = "10";
const DEFAULT_RMW_IMPLEMENTATION: &str = "rmw_fastrtps_cpp";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile '{profile}' is malformed: {reason}")]
    Malformed { profile: String, reason: String },
    #[error("profile '{profile}' declares service '{service}' more than once")]
    DuplicateService { profile: String, service: String },
}

/// Which of the two profile layouts a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// `skills:` entries, each brought up from its own compose file.
    Skills,
    /// `services:` entries, scoped to the project compose files.
    Services,
}

impl ProfileKind {
    fn list_key(self) -> &'static str {
        match self {
            ProfileKind::Skills => "skills",
            ProfileKind::Services => "services",
        }
    }

    fn waits_by_default(self) -> bool {
        matches!(self, ProfileKind::Skills)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.list_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub depends_on: Vec<String>,
    pub wait_for_healthy: bool,
    pub environment: BTreeMap<String, String>,
    /// Informational only: the compose file owns the container command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Informational only: status tiers come from the skills catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_profile: Option<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            wait_for_healthy: false,
            environment: BTreeMap::new(),
            command: None,
            tier: None,
            compose_profile: None,
        }
    }

    #[cfg(test)]
    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|name| name.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosSettings {
    pub domain_id: String,
    pub rmw_implementation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub kind: ProfileKind,
    pub services: Vec<ServiceConfig>,
    pub environment: BTreeMap<String, String>,
    pub compose_files: Vec<String>,
    pub env_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ros: Option<RosSettings>,
}

impl Profile {
    /// Build a typed profile from a fully resolved document. `fallback_name`
    /// is used when the document carries no `name`.
    pub fn from_document(fallback_name: &str, document: &Value) -> Result<Self, ProfileError> {
        let malformed = |reason: String| ProfileError::Malformed {
            profile: fallback_name.to_string(),
            reason,
        };
        let root = document
            .as_mapping()
            .ok_or_else(|| malformed("document is not a mapping".into()))?;

        let name = optional_string(root, "name")
            .map_err(malformed)?
            .unwrap_or_else(|| fallback_name.to_string());
        let description = optional_string(root, "description")
            .map_err(malformed)?
            .unwrap_or_default();
        let kind = if root.contains_key("skills") {
            ProfileKind::Skills
        } else {
            ProfileKind::Services
        };

        let services = match root.get(kind.list_key()) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| parse_service(item, kind))
                .collect::<Result<Vec<_>, _>>()
                .map_err(malformed)?,
            Some(_) => return Err(malformed(format!("'{}' must be a sequence", kind))),
        };
        let mut seen = Vec::with_capacity(services.len());
        for service in &services {
            if seen.contains(&service.name.as_str()) {
                return Err(ProfileError::DuplicateService {
                    profile: name,
                    service: service.name.clone(),
                });
            }
            seen.push(service.name.as_str());
        }

        let ros = match root.get("ros") {
            None | Some(Value::Null) => None,
            Some(Value::Mapping(ros)) => Some(RosSettings {
                domain_id: ros
                    .get("domain_id")
                    .and_then(stringify)
                    .unwrap_or_else(|| DEFAULT_DOMAIN_ID.to_string()),
                rmw_implementation: ros
                    .get("rmw_implementation")
                    .and_then(stringify)
                    .unwrap_or_else(|| DEFAULT_RMW_IMPLEMENTATION.to_string()),
            }),
            Some(_) => return Err(malformed("'ros' must be a mapping".into())),
        };

        Ok(Self {
            name,
            description,
            kind,
            services,
            environment: string_map(root.get("environment"), "environment").map_err(malformed)?,
            compose_files: string_list(root.get("compose_files"), "compose_files")
                .map_err(malformed)?,
            env_files: string_list(root.get("env_files"), "env_files").map_err(malformed)?,
            ros,
        })
    }

    /// Profile-wide environment handed to every service: ROS settings first,
    /// then the explicit `environment` map on top.
    pub fn global_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(ros) = &self.ros {
            env.insert("ROS_DOMAIN_ID".to_string(), ros.domain_id.clone());
            env.insert(
                "RMW_IMPLEMENTATION".to_string(),
                ros.rmw_implementation.clone(),
            );
        }
        env.extend(
            self.environment
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        env
    }
}

/// Condensed view used by the profile listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub description: String,
    pub skills: Vec<String>,
}

impl ProfileInfo {
    pub fn from_document(fallback_name: &str, document: &Value) -> Self {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(fallback_name)
            .to_string();
        let description = document
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entries = document
            .get("skills")
            .or_else(|| document.get("services"))
            .and_then(Value::as_sequence);
        let skills = entries
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(name) => name.clone(),
                        other => other
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name,
            description,
            skills,
        }
    }
}

fn parse_service(item: &Value, kind: ProfileKind) -> Result<ServiceConfig, String> {
    let entry = match item {
        Value::String(name) => {
            let mut service = ServiceConfig::new(name.clone());
            service.wait_for_healthy = kind.waits_by_default();
            return Ok(service);
        }
        Value::Mapping(entry) => entry,
        _ => return Err(format!("{} entries must be names or mappings", kind)),
    };
    let name = optional_string(entry, "name")?
        .ok_or_else(|| format!("{} entry is missing 'name'", kind))?;
    let wait_for_healthy = match entry.get("wait_for_healthy") {
        None | Some(Value::Null) => kind.waits_by_default(),
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(format!("'{}': wait_for_healthy must be a boolean", name)),
    };
    let mut depends_on = string_list(entry.get("depends_on"), "depends_on")?;
    let mut unique = Vec::with_capacity(depends_on.len());
    depends_on.retain(|dep| {
        if unique.contains(dep) {
            false
        } else {
            unique.push(dep.clone());
            true
        }
    });
    Ok(ServiceConfig {
        depends_on,
        wait_for_healthy,
        environment: string_map(entry.get("environment"), "environment")?,
        command: optional_string(entry, "command")?,
        tier: optional_string(entry, "tier")?,
        compose_profile: optional_string(entry, "compose_profile")?,
        name,
    })
}

fn optional_string(map: &Mapping, key: &str) -> Result<Option<String>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(format!("'{}' must be a string", key)),
    }
}

/// Accepts a single string or a sequence of scalars.
fn string_list(value: Option<&Value>, key: &str) -> Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    stringify(item).ok_or_else(|| format!("'{}' contains an empty entry", key))
                }
                _ => Err(format!("'{}' entries must be scalars", key)),
            })
            .collect(),
        Some(_) => Err(format!("'{}' must be a string or a sequence", key)),
    }
}

fn string_map(value: Option<&Value>, key: &str) -> Result<BTreeMap<String, String>, String> {
    let map = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err(format!("'{}' must be a mapping", key)),
    };
    let mut result = BTreeMap::new();
    for (name, item) in map {
        let name = stringify(name).ok_or_else(|| format!("'{}' has an empty key", key))?;
        result.insert(name, stringify(item).unwrap_or_default());
    }
    Ok(result)
}
