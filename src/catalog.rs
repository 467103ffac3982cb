use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::Value;

/// Skills grouped by tier, as declared in `infrastructure/skills.yaml`.
///
/// Loaded once per invocation and passed to whoever needs it.
#[derive(Debug, Clone, Default)]
pub struct SkillsCatalog {
    tiers: Vec<(String, Vec<String>)>,
}

impl SkillsCatalog {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no skills catalog at {:?}", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read skills catalog at {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("failed to parse skills catalog at {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: Value = serde_yaml::from_str(contents)?;
        let declared = match document.get("skills") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Mapping(declared)) => declared,
            Some(_) => anyhow::bail!("'skills' must map tiers to skill lists"),
        };
        let mut tiers = Vec::with_capacity(declared.len());
        for (tier, skills) in declared {
            let tier = tier
                .as_str()
                .context("tier names must be strings")?
                .to_string();
            let skills = match skills {
                Value::Null => Vec::new(),
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .with_context(|| format!("skill names in tier '{}' must be strings", tier))
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => anyhow::bail!("tier '{}' must list skill names", tier),
            };
            tiers.push((tier, skills));
        }
        Ok(Self { tiers })
    }

    /// Every `(tier, skill)` pair in declaration order.
    pub fn skills(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tiers.iter().flat_map(|(tier, skills)| {
            skills
                .iter()
                .map(move |skill| (tier.as_str(), skill.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|(_, skills)| skills.is_empty())
    }
}
