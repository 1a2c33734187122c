//! Build/upgrade eligibility. Every check is a linear scan of the registry;
//! nothing is indexed incrementally.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{Catalog, MachineType, Requirement};
use crate::registry::{MachineInstance, MachineRegistry};

/// Why a machine type cannot be built right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildBlocker {
    /// The registry has no machine id left to hand out.
    IdsExhausted,
    CeilingReached { machine: MachineType, ceiling: usize },
    Unmet {
        requirement: Requirement,
        note: &'static str,
    },
}

impl fmt::Display for BuildBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildBlocker::IdsExhausted => f.write_str("no machine ids left"),
            BuildBlocker::CeilingReached { machine, ceiling } => {
                write!(f, "{machine} limit reached ({ceiling})")
            }
            BuildBlocker::Unmet { requirement, .. } => write!(f, "{requirement}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressionGate<'a> {
    catalog: &'a Catalog,
    ceilings: &'a BTreeMap<MachineType, usize>,
}

impl<'a> ProgressionGate<'a> {
    /// Types missing from `ceilings` may be built without limit.
    pub fn new(catalog: &'a Catalog, ceilings: &'a BTreeMap<MachineType, usize>) -> Self {
        Self { catalog, ceilings }
    }

    pub fn can_build(&self, machine: MachineType, registry: &MachineRegistry) -> bool {
        registry.has_free_id()
            && !self.ceiling_reached(machine, registry)
            && self.catalog.prerequisite_satisfied(machine, registry)
    }

    /// Every unmet condition, in table order. Empty iff `can_build`.
    pub fn blockers(&self, machine: MachineType, registry: &MachineRegistry) -> Vec<BuildBlocker> {
        let mut out = Vec::new();
        if !registry.has_free_id() {
            out.push(BuildBlocker::IdsExhausted);
        }
        if let Some(&ceiling) = self.ceilings.get(&machine) {
            if registry.count_of(machine) >= ceiling {
                out.push(BuildBlocker::CeilingReached { machine, ceiling });
            }
        }
        let owned = registry.count_of(machine);
        for rule in self.catalog.rules_for(machine, owned) {
            for requirement in rule.requires {
                if !requirement.is_met(self.catalog, registry) {
                    out.push(BuildBlocker::Unmet {
                        requirement: *requirement,
                        note: rule.note,
                    });
                }
            }
        }
        out
    }

    pub fn can_upgrade(&self, instance: &MachineInstance) -> bool {
        instance.level < self.catalog.max_level(instance.machine_type)
    }

    fn ceiling_reached(&self, machine: MachineType, registry: &MachineRegistry) -> bool {
        self.ceilings
            .get(&machine)
            .is_some_and(|&ceiling| registry.count_of(machine) >= ceiling)
    }
}
