//! Engine configuration.

use serde::{Deserialize, Serialize};

fn default_retention_days() -> u32 {
    30
}

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long pre-mutation snapshots are retained, in days. Sweeps delete
    /// snapshots captured strictly before `now - retention_days`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}
