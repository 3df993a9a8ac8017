// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::generate::{GenOptions, MacroDefinition};
use crate::util::read_file_str;

/// Optional YAML run configuration. Every key may be left out.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub macros: Vec<String>,
    pub stack_size: Option<u64>,
    pub heap_size: Option<u64>,
    pub stack_guard_size: Option<u64>,
    #[serde(default)]
    pub copyright: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        serde_yaml::from_str(&read_file_str(path)?)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Generator options from this config, with `extra_macros` (from the command line) last.
    pub fn into_options(self, extra_macros: Vec<MacroDefinition>) -> Result<GenOptions> {
        let defaults = GenOptions::default();

        let mut macros = self.macros.iter()
            .map(|m| m.parse::<MacroDefinition>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()
            .context("Invalid macro in config")?;
        macros.extend(extra_macros);

        Ok(GenOptions {
            macros,
            copyright: self.copyright,
            stack_size: self.stack_size.unwrap_or(defaults.stack_size),
            heap_size: self.heap_size.unwrap_or(defaults.heap_size),
            stack_guard_size: self.stack_guard_size.unwrap_or(defaults.stack_guard_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config: Config = serde_yaml::from_str("
macros:
  - USE_CMSIS
  - BOARD=2
stack_size: 2048
heap_size: 0
copyright:
  - Copyright (c) 2024 Example Corp.
").unwrap();

        let opts = config.into_options(vec!["DEBUG".parse().unwrap()]).unwrap();
        let macros = opts.macros.iter().map(|m| m.to_string()).collect::<Vec<_>>();
        assert_eq!(macros, ["-DUSE_CMSIS", "-DBOARD=2", "-DDEBUG"]);
        assert_eq!(opts.stack_size, 2048);
        assert_eq!(opts.heap_size, 0);
        assert_eq!(opts.stack_guard_size, GenOptions::default().stack_guard_size);
        assert_eq!(opts.copyright, ["Copyright (c) 2024 Example Corp."]);
    }

    #[test]
    fn empty_config_gives_defaults() {
        let opts = Config::default().into_options(vec![]).unwrap();
        assert_eq!(opts, GenOptions::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("stack_sise: 12").is_err());
    }

    #[test]
    fn bad_macros_are_rejected() {
        let config: Config = serde_yaml::from_str("macros: ['9LIVES']").unwrap();
        assert!(config.into_options(vec![]).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "stack_guard_size: 64\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().stack_guard_size, Some(64));

        std::fs::write(&path, "stack_guard_size: [1]\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
