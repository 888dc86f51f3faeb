// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/waygate/config.yaml"));
    paths.push(PathBuf::from("/etc/waygate/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/waygate/config.yaml"));
        paths.push(home.join(".config/waygate/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("waygate/config.yaml"));
        paths.push(cfg.join("waygate/config.yml"));
    }

    paths.push(PathBuf::from(".waygate/config.yaml"));
    paths.push(PathBuf::from(".waygate/config.yml"));
    paths.push(PathBuf::from(".waygate.yaml"));
    paths.push(PathBuf::from(".waygate.yml"));
    paths.push(PathBuf::from("waygate.yaml"));
    paths.push(PathBuf::from("waygate.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then an optional
/// explicit path (e.g. `--config` CLI flag), then environment overrides for
/// secrets.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).with_context(|| "parsing merged configuration")?
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Secrets never live in a committed config file; pull them from the
/// environment last so they always win over whatever is on disk.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("WAYGATE_API_KEY") {
        config.model.api_key = Some(key);
    }
    if let Ok(base_url) = std::env::var("WAYGATE_BASE_URL") {
        config.model.base_url = base_url;
    }
    if let Ok(model) = std::env::var("WAYGATE_MODEL") {
        config.model.name = model;
    }
    if let Ok(ws) = std::env::var("WAYGATE_WORKSPACE") {
        config.workspace_dir = PathBuf::from(ws);
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
