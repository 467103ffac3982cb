use anyhow::Result;

use crate::catalog::SkillsCatalog;
use crate::config::{CtlConfig, ProjectPaths};
use crate::runtime::{ComposeRuntime, ContainerRuntime, ServiceStatus, ServiceTarget};

const PROJECT_TIER: &str = "project";

/// Best-effort view of every known service: the project compose file plus
/// each catalog skill that has a compose file of its own.
pub struct StatusInspector<'a, R: ContainerRuntime> {
    runtime: &'a R,
    paths: &'a ProjectPaths,
    catalog: &'a SkillsCatalog,
}

impl<'a, R: ContainerRuntime> StatusInspector<'a, R> {
    pub fn new(runtime: &'a R, paths: &'a ProjectPaths, catalog: &'a SkillsCatalog) -> Self {
        Self {
            runtime,
            paths,
            catalog,
        }
    }

    /// Sources that fail to answer contribute nothing.
    pub fn get_all_status(&self) -> Vec<ServiceStatus> {
        let project = ServiceTarget::Project {
            compose_files: Vec::new(),
        };
        let mut statuses: Vec<ServiceStatus> = self
            .query(&project)
            .into_iter()
            .map(|mut status| {
                status.tier = Some(PROJECT_TIER.to_string());
                status
            })
            .collect();

        if self.catalog.is_empty() {
            log::debug!("skills catalog declares no skills");
        }
        for (tier, skill) in self.catalog.skills() {
            if self.paths.skill_compose_file(skill).is_none() {
                log::debug!("skill '{}' has no compose file, skipping", skill);
                continue;
            }
            let target = ServiceTarget::Skill {
                name: skill.to_string(),
            };
            statuses.extend(self.query(&target).into_iter().map(|mut status| {
                status.name = format!("{}/{}", skill, status.name);
                status.tier = Some(tier.to_string());
                status
            }));
        }
        statuses
    }

    fn query(&self, target: &ServiceTarget) -> Vec<ServiceStatus> {
        match self.runtime.query_status(target) {
            Ok(statuses) => statuses,
            Err(err) => {
                log::debug!("no status for {}: {}", target, err);
                Vec::new()
            }
        }
    }
}

/// Statuses grouped by tier, groups in first-seen order.
fn group_by_tier(statuses: &[ServiceStatus]) -> Vec<(&str, Vec<&ServiceStatus>)> {
    let mut groups: Vec<(&str, Vec<&ServiceStatus>)> = Vec::new();
    for status in statuses {
        let tier = status.tier.as_deref().unwrap_or(PROJECT_TIER);
        match groups.iter_mut().find(|(name, _)| *name == tier) {
            Some((_, members)) => members.push(status),
            None => groups.push((tier, vec![status])),
        }
    }
    groups
}

/// The skills catalog, or an empty one when it cannot be read so that the
/// project services are still reported.
fn load_catalog(paths: &ProjectPaths) -> SkillsCatalog {
    SkillsCatalog::load_or_default(&paths.skills_catalog).unwrap_or_else(|err| {
        log::warn!("ignoring skills catalog: {:#}", err);
        SkillsCatalog::default()
    })
}

pub fn handle_status(config: &CtlConfig, paths: &ProjectPaths) -> Result<()> {
    let catalog = load_catalog(paths);
    let runtime = ComposeRuntime::new(&config.runtime, paths.clone());
    let statuses = StatusInspector::new(&runtime, paths, &catalog).get_all_status();

    if statuses.is_empty() {
        println!("No containers running.");
        return Ok(());
    }

    println!("{:<35} {:<12} {:<15} HEALTH", "SERVICE", "STATE", "CONTAINER ID");
    for (tier, members) in group_by_tier(&statuses) {
        println!("[{}]", tier);
        for status in members {
            println!(
                "{:<35} {:<12} {:<15} {}",
                status.name,
                status.state,
                status.short_id(),
                status.health.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
