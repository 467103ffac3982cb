mod controller;
mod env;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{CtlConfig, ProjectPaths};
use crate::profile::{OrderError, ProfileManager};
use crate::runtime::ComposeRuntime;

pub use controller::{LifecycleController, LifecycleSettings};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("failed to read env file {path:?}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn handle_up(profile_name: &str, config: &CtlConfig, paths: &ProjectPaths) -> Result<ExitCode> {
    let mut manager = ProfileManager::new(paths.profiles_dir.clone());
    let profile = manager
        .resolve(profile_name)
        .with_context(|| format!("failed to resolve profile '{}'", profile_name))?;
    let env_files = paths.resolve_env_files(&profile.env_files);
    let global_env = profile.global_environment();

    println!("Starting profile: {} ({} {})", profile.name, profile.services.len(), profile.kind);
    let runtime = ComposeRuntime::new(&config.runtime, paths.clone());
    let controller = LifecycleController::new(&runtime, LifecycleSettings::from(&config.readiness));
    let report = controller.start(&profile, &global_env, &env_files)?;

    if report.success() {
        println!("Profile '{}' is up.", profile.name);
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "Profile '{}' failed to start; {} service(s) left running.",
            profile.name,
            report.started.len()
        );
        Ok(ExitCode::FAILURE)
    }
}

pub fn handle_down(profile_name: Option<&str>, config: &CtlConfig, paths: &ProjectPaths) -> Result<ExitCode> {
    let runtime = ComposeRuntime::new(&config.runtime, paths.clone());
    let controller = LifecycleController::new(&runtime, LifecycleSettings::from(&config.readiness));

    let Some(profile_name) = profile_name else {
        println!("Stopping all project containers");
        return Ok(if controller.stop_all(&paths.project_root) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    };

    let mut manager = ProfileManager::new(paths.profiles_dir.clone());
    let profile = manager
        .resolve(profile_name)
        .with_context(|| format!("failed to resolve profile '{}'", profile_name))?;
    let env_files = paths.resolve_env_files(&profile.env_files);

    println!("Stopping profile: {}", profile.name);
    let report = controller.stop(&profile, &profile.global_environment(), &env_files)?;
    if report.success() {
        println!("Profile '{}' is down.", profile.name);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Failed to stop: {}", report.failed.join(", "));
        Ok(ExitCode::FAILURE)
    }
}
