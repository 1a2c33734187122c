use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::registry::MachineInstance;

pub const NEVER_MINTED: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MintStatus {
    NotEligible,
    Available,
    Minted { at: u64 },
}

pub fn mint_status(catalog: &Catalog, instance: &MachineInstance) -> MintStatus {
    if !catalog.descriptor(instance.machine_type).mint_eligible {
        MintStatus::NotEligible
    } else if instance.last_activated == NEVER_MINTED {
        MintStatus::Available
    } else {
        MintStatus::Minted {
            at: instance.last_activated,
        }
    }
}

/// Consumes the instance's mint right, stamping it with `marker` (clamped to
/// be non-zero). Returns false if the right was already used or never existed.
pub(crate) fn consume(catalog: &Catalog, instance: &mut MachineInstance, marker: u64) -> bool {
    if mint_status(catalog, instance) != MintStatus::Available {
        return false;
    }
    instance.last_activated = marker.max(1);
    true
}
