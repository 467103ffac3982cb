mod manager;
mod model;
mod order;

use anyhow::{Context, Result};

use crate::cli::{OutputFormat, ProfileCommand};
use crate::config::ProjectPaths;

pub use manager::ProfileManager;
pub use model::{Profile, ProfileKind, ServiceConfig};
pub use order::{OrderError, start_order, stop_order};

pub fn handle_profiles(command: Option<ProfileCommand>, paths: &ProjectPaths) -> Result<()> {
    match command {
        None | Some(ProfileCommand::List) => list_profiles(paths),
        Some(ProfileCommand::Show { profile, format }) => handle_show(&profile, format, paths),
    }
}

fn list_profiles(paths: &ProjectPaths) -> Result<()> {
    let mut manager = ProfileManager::new(paths.profiles_dir.clone());
    let names = manager.list_profiles()?;
    println!("Available profiles:\n");
    if names.is_empty() {
        println!("  No profiles found.");
        return Ok(());
    }
    for name in names {
        match manager.get_profile_info(&name) {
            Ok(info) => {
                println!("  {}", name);
                if !info.description.is_empty() {
                    println!("    {}", info.description);
                }
                println!("    Skills: {}", info.skills.join(", "));
                println!();
            }
            Err(err) => println!("  {} (error: {})", name, err),
        }
    }
    Ok(())
}

/// Print the fully resolved profile document.
pub fn handle_show(name: &str, format: OutputFormat, paths: &ProjectPaths) -> Result<()> {
    let mut manager = ProfileManager::new(paths.profiles_dir.clone());
    let document = match manager.load_profile(name) {
        Ok(document) => document,
        Err(err) if err.is_not_found() => {
            let available = manager.list_profiles()?;
            anyhow::bail!("profile '{}' not found (available: {})", name, available.join(", "));
        }
        Err(err) => return Err(err).with_context(|| format!("failed to load profile '{}'", name)),
    };
    let encoded = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&document)?,
        OutputFormat::Json => serde_json::to_string_pretty(&document)?,
    };
    println!("{}", encoded.trim_end());
    Ok(())
}
