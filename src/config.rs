use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::world::FactionId;

//////////////////////////////////////////////////////////////////////////////

// Search bounds. These are the only limits on per-unit, per-turn cost.

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    // Maximum A* heap extractions per route.
    pub astar_limit: i32,
    // Maximum predicate evaluations per nearest-match search.
    pub bfs_range: i32,
    // Maximum tiles visited when sweeping for city sites.
    pub site_range: i32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { astar_limit: 4096, bfs_range: 400, site_range: 120 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DefenseConfig {
    pub strength_weight: i32,
    pub defender_penalty: i32,
    pub distance_penalty: i32,
    pub min_score: i32,
    pub max_score: i32,
    pub min_defenders: i32,
    pub hold_turns_min: i32,
    pub hold_turns_max: i32,
    pub escort_range: i32,
    pub escort_turns: i32,
    pub production_priority: i32,
    pub garrison_priority: i32,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            strength_weight: 60,
            defender_penalty: 20,
            distance_penalty: 2,
            // Low enough that every added defender still lowers the score.
            min_score: -1000,
            max_score: 600,
            min_defenders: 1,
            hold_turns_min: 3,
            hold_turns_max: 6,
            escort_range: 3,
            escort_turns: 12,
            production_priority: 300,
            garrison_priority: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OffenseConfig {
    pub strength_weight: i32,
    pub distance_penalty: i32,
    pub production_priority: i32,
}

impl Default for OffenseConfig {
    fn default() -> Self {
        Self { strength_weight: 20, distance_penalty: 3, production_priority: 150 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub priority: i32,
    // Military units explore at priority / military_divisor.
    pub military_divisor: i32,
    pub auto_continue: bool,
    pub production_priority: i32,
    pub production_radius: i32,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            priority: 100,
            military_divisor: 3,
            auto_continue: true,
            production_priority: 120,
            production_radius: 6,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub first_city_priority: i32,
    pub max_score: i32,
    pub distance_penalty: i32,
    pub min_city_distance: i32,
    pub food_weight: i32,
    pub shield_weight: i32,
    pub trade_weight: i32,
    pub city_target: i32,
    pub settler_min_size: i32,
    pub production_priority: i32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            first_city_priority: 1000,
            max_score: 400,
            distance_penalty: 4,
            min_city_distance: 3,
            food_weight: 3,
            shield_weight: 2,
            trade_weight: 1,
            city_target: 6,
            settler_min_size: 2,
            production_priority: 200,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CommerceConfig {
    pub worker_priority: i32,
    pub worker_search_range: i32,
    pub production_priority: i32,
    pub building_priority: i32,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            worker_priority: 200,
            worker_search_range: 4,
            production_priority: 180,
            building_priority: 100,
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Logging scope

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    // Per-unit decisions are logged for this faction only.
    pub debug_faction: Option<u32>,
}

impl LogConfig {
    pub fn is_debug(&self, faction: FactionId) -> bool {
        self.debug_faction == Some(faction.0)
    }
}

//////////////////////////////////////////////////////////////////////////////

// AIConfig

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AIConfig {
    pub seed: u64,
    pub search: SearchConfig,
    pub defense: DefenseConfig,
    pub offense: OffenseConfig,
    pub explore: ExploreConfig,
    pub expansion: ExpansionConfig,
    pub commerce: CommerceConfig,
    pub log: LogConfig,
}

impl AIConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AIConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |x: &str| Err(ConfigError::Invalid(x.to_string()));
        if self.search.astar_limit <= 0 { return invalid("search.astar_limit must be positive"); }
        if self.search.bfs_range <= 0 { return invalid("search.bfs_range must be positive"); }
        if self.search.site_range <= 0 { return invalid("search.site_range must be positive"); }
        let defense = &self.defense;
        if defense.min_score > defense.max_score {
            return invalid("defense.min_score exceeds defense.max_score");
        }
        if defense.hold_turns_min < 1 || defense.hold_turns_min > defense.hold_turns_max {
            return invalid("defense.hold_turns_min must be in [1, hold_turns_max]");
        }
        if self.explore.military_divisor <= 0 {
            return invalid("explore.military_divisor must be positive");
        }
        Ok(())
    }
}

//////////////////////////////////////////////////////////////////////////////
