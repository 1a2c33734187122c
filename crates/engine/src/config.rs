use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::MachineType;
use crate::resources::ResourceLedger;

/// Tunables that are not part of the static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum instance count per type. Types not listed are unlimited.
    pub build_ceilings: BTreeMap<MachineType, usize>,
    /// Upper bound on `rooms_unlocked`; `None` means no bound.
    pub max_rooms: Option<u32>,
    /// Ledger handed to a player with no saved state.
    pub starting_resources: ResourceLedger,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_ceilings: BTreeMap::new(),
            max_rooms: None,
            starting_resources: ResourceLedger::new(0.0, 10.0, 0.0, 0.0),
        }
    }
}
