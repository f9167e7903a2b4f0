//! Daemon configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then `COSMOSD_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `COSMOSD_RULES__INITIATIVE_DIE=12`). CLI flags are applied
//! last by the binary.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::combat::{RoundRules, Scale, DEFAULT_HISTORY_LIMIT, DIE_SIDES};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; `None` keeps everything in memory
    pub db_path: Option<String>,
    pub rules: RulesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: None,
            rules: RulesConfig::default(),
        }
    }
}

/// Table rules applied to every encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Sides on the initiative die
    pub initiative_die: u32,
    /// Rolls kept in the dice history
    pub history_limit: usize,
    /// Scale new encounters start at
    pub default_scale: Scale,
    /// Status tag -> damage dealt at each round boundary
    pub damage_over_time: BTreeMap<String, u32>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            initiative_die: DIE_SIDES,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_scale: Scale::default(),
            damage_over_time: RoundRules::default().damage_over_time,
        }
    }
}

impl RulesConfig {
    /// Rules handed to each encounter state machine
    pub fn round_rules(&self) -> RoundRules {
        RoundRules {
            initiative_die: self.initiative_die.max(1),
            damage_over_time: self
                .damage_over_time
                .iter()
                .filter(|(_, damage)| **damage > 0)
                .map(|(tag, damage)| (tag.trim().to_lowercase(), *damage))
                .collect(),
        }
    }
}

impl Config {
    /// The provider stack without CLI overrides
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("COSMOSD_").split("__"))
    }

    /// Load configuration from defaults, file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }
}
