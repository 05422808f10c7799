// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::TurnConfig;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();

    paths.push(std::path::PathBuf::from("/etc/massgen/config.toml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/massgen/config.toml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("massgen/config.toml"));
    }

    paths.push(std::path::PathBuf::from(".massgen/config.toml"));
    paths.push(std::path::PathBuf::from("massgen.toml"));

    paths
}

/// Load a `TurnConfig` by merging all discovered TOML layers, then an
/// optional explicit override path. Missing layers are skipped silently;
/// an explicit path that does not exist is an error.
pub fn load(extra: Option<&Path>) -> anyhow::Result<TurnConfig> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: toml::Value =
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            merge_toml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: toml::Value =
            toml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_toml(&mut merged, layer);
    }

    let config: TurnConfig = if matches!(merged, toml::Value::Table(ref t) if t.is_empty()) {
        TurnConfig::default()
    } else {
        merged.try_into().unwrap_or_default()
    };
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x = 1");
        let src = val("x = 2");
        merge_toml(&mut dst, src);
        assert_eq!(dst["x"].as_integer(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("[novelty]\nthreshold = 0.5\n[timeouts]\nsubsequent_round_timeout_secs = 100");
        let src = val("[novelty]\nthreshold = 0.9");
        merge_toml(&mut dst, src);
        assert_eq!(dst["novelty"]["threshold"].as_float(), Some(0.9));
        assert_eq!(
            dst["timeouts"]["subsequent_round_timeout_secs"].as_integer(),
            Some(100)
        );
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/massgen_nonexistent_config_xyz.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.novelty.threshold, 0.70);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[novelty]\nthreshold = 0.5\n[restarts]\nmax_restarts_per_agent = 5").unwrap();
        let config = load(Some(f.path())).unwrap();
        assert_eq!(config.novelty.threshold, 0.5);
        assert_eq!(config.restarts.max_restarts_per_agent, 5);
    }
}
