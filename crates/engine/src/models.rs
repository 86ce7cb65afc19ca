//! Model discovery via the engine CLI.
//!
//! `fabric --listmodels` prints numbered entries, optionally qualified
//! with a vendor as `provider|model`. Entries without a vendor land in
//! an "Other" bucket so the picker always has a group to show.

use std::collections::{BTreeMap, BTreeSet};
use std::process::Command;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\]\s*(.+)$").expect("valid regex"));
static DEFAULT_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^DEFAULT_MODEL=(.+)$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProvider {
    pub name: String,
    /// Sorted and deduplicated.
    pub models: Vec<String>,
}

/// Models grouped by provider, providers ordered case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    providers: Vec<ModelProvider>,
}

impl ModelCatalog {
    /// Runs `{command} --listmodels` and parses its output.
    pub fn load(command: &str) -> anyhow::Result<Self> {
        let output = Command::new(command)
            .arg("--listmodels")
            .output()
            .with_context(|| format!("failed to run `{command} --listmodels`"))?;
        if !output.status.success() {
            anyhow::bail!(
                "`{command} --listmodels` failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Parses listmodels output. Unrecognized lines (headers, blanks)
    /// are skipped rather than treated as errors.
    pub fn parse(output: &str) -> Self {
        let mut by_provider: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for line in output.lines() {
            let Some(caps) = ENTRY.captures(line.trim()) else {
                continue;
            };
            let entry = caps[1].trim();
            let (provider, model) = match entry.split_once('|') {
                Some((provider, model)) => (provider.trim(), model.trim()),
                None => ("Other", entry),
            };
            if model.is_empty() {
                continue;
            }
            by_provider
                .entry(provider.to_string())
                .or_default()
                .insert(model.to_string());
        }
        let mut providers: Vec<ModelProvider> = by_provider
            .into_iter()
            .map(|(name, models)| ModelProvider {
                name,
                models: models.into_iter().collect(),
            })
            .collect();
        providers.sort_by_key(|provider| provider.name.to_lowercase());
        Self { providers }
    }

    pub fn providers(&self) -> &[ModelProvider] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// The engine's own configured default model, read from its dotenv
/// file under the user's home directory.
pub fn engine_default_model() -> Option<String> {
    let base = directories::BaseDirs::new()?;
    let env_path = base.home_dir().join(".config").join("fabric").join(".env");
    let text = std::fs::read_to_string(env_path).ok()?;
    default_model_from_env(&text)
}

fn default_model_from_env(text: &str) -> Option<String> {
    DEFAULT_MODEL
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}
