//! Static machine catalog: display metadata, cost tables, level caps and the
//! prerequisite rule table consulted by the progression gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::registry::MachineRegistry;
use crate::resources::{ResourceBundle, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineType {
    #[serde(alias = "catLair")]
    CatsLair,
    Reactor,
    Amplifier,
    Incubator,
    FomoHit,
}

impl MachineType {
    pub const ALL: [MachineType; 5] = [
        MachineType::CatsLair,
        MachineType::Reactor,
        MachineType::Amplifier,
        MachineType::Incubator,
        MachineType::FomoHit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MachineType::CatsLair => "catsLair",
            MachineType::Reactor => "reactor",
            MachineType::Amplifier => "amplifier",
            MachineType::Incubator => "incubator",
            MachineType::FomoHit => "fomoHit",
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown machine type: {0}")]
pub struct UnknownMachineType(pub String);

impl FromStr for MachineType {
    type Err = UnknownMachineType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The persistence backend still writes the legacy `catLair` spelling.
        if s == "catLair" {
            return Ok(MachineType::CatsLair);
        }
        MachineType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownMachineType(s.to_string()))
    }
}

/// How the build cost grows with the number of machines of the same type
/// already owned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostScaling {
    Flat,
    Geometric { ratio: f64 },
}

impl CostScaling {
    pub fn factor(self, owned: usize) -> f64 {
        match self {
            CostScaling::Flat => 1.0,
            CostScaling::Geometric { ratio } => {
                let exp = i32::try_from(owned).unwrap_or(i32::MAX);
                ratio.max(1.0).powi(exp)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MachineTypeDescriptor {
    pub machine: MachineType,
    pub name: &'static str,
    pub icon: &'static str,
    pub base_color: &'static str,
    pub base_cost: &'static [(ResourceKind, f64)],
    pub build_scaling: CostScaling,
    /// 1 means the type has no levels.
    pub max_level: u32,
    /// Whether an instance carries a one-shot NFT mint right.
    pub mint_eligible: bool,
}

impl MachineTypeDescriptor {
    pub fn base_cost(&self) -> ResourceBundle {
        self.base_cost.iter().copied().collect()
    }

    pub fn levelable(&self) -> bool {
        self.max_level > 1
    }
}

static DESCRIPTORS: [MachineTypeDescriptor; 5] = [
    MachineTypeDescriptor {
        machine: MachineType::CatsLair,
        name: "Cat's Lair",
        icon: "🐱",
        base_color: "#FF9800",
        base_cost: &[(ResourceKind::CatNips, 5.0)],
        build_scaling: CostScaling::Geometric { ratio: 1.5 },
        max_level: 3,
        mint_eligible: false,
    },
    MachineTypeDescriptor {
        machine: MachineType::Reactor,
        name: "Reactor",
        icon: "⚛️",
        base_color: "#2196F3",
        base_cost: &[(ResourceKind::TCorvax, 10.0), (ResourceKind::CatNips, 10.0)],
        build_scaling: CostScaling::Geometric { ratio: 1.5 },
        max_level: 3,
        mint_eligible: false,
    },
    MachineTypeDescriptor {
        machine: MachineType::Amplifier,
        name: "Amplifier",
        icon: "🔊",
        base_color: "#9C27B0",
        base_cost: &[
            (ResourceKind::TCorvax, 20.0),
            (ResourceKind::CatNips, 20.0),
            (ResourceKind::Energy, 10.0),
        ],
        build_scaling: CostScaling::Geometric { ratio: 1.5 },
        max_level: 5,
        mint_eligible: false,
    },
    MachineTypeDescriptor {
        machine: MachineType::Incubator,
        name: "Incubator",
        icon: "🥚",
        base_color: "#E91E63",
        base_cost: &[
            (ResourceKind::TCorvax, 50.0),
            (ResourceKind::CatNips, 50.0),
            (ResourceKind::Energy, 50.0),
        ],
        build_scaling: CostScaling::Geometric { ratio: 2.0 },
        max_level: 2,
        mint_eligible: false,
    },
    MachineTypeDescriptor {
        machine: MachineType::FomoHit,
        name: "FOMO HIT",
        icon: "🔥",
        base_color: "#FF5722",
        base_cost: &[
            (ResourceKind::TCorvax, 100.0),
            (ResourceKind::CatNips, 100.0),
            (ResourceKind::Energy, 100.0),
        ],
        build_scaling: CostScaling::Flat,
        max_level: 1,
        mint_eligible: true,
    },
];

/// Which instance of a type a prerequisite rule guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSelector {
    Every,
    /// 1-based position of the instance about to be built.
    Nth(usize),
}

impl InstanceSelector {
    pub fn applies(self, owned: usize) -> bool {
        match self {
            InstanceSelector::Every => true,
            InstanceSelector::Nth(n) => owned + 1 == n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Owns { machine: MachineType, at_least: usize },
    ReachedLevel { machine: MachineType, level: u32 },
    ReachedMaxLevel { machine: MachineType },
}

impl Requirement {
    pub fn is_met(self, catalog: &Catalog, registry: &MachineRegistry) -> bool {
        match self {
            Requirement::Owns { machine, at_least } => registry.count_of(machine) >= at_least,
            Requirement::ReachedLevel { machine, level } => {
                registry.highest_level_of(machine).is_some_and(|l| l >= level)
            }
            Requirement::ReachedMaxLevel { machine } => registry
                .highest_level_of(machine)
                .is_some_and(|l| l >= catalog.max_level(machine)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Owns { machine, at_least: 1 } => write!(f, "requires a {machine}"),
            Requirement::Owns { machine, at_least } => {
                write!(f, "requires {at_least} × {machine}")
            }
            Requirement::ReachedLevel { machine, level } => {
                write!(f, "requires a {machine} at level {level}")
            }
            Requirement::ReachedMaxLevel { machine } => {
                write!(f, "requires a {machine} at max level")
            }
        }
    }
}

/// One tagged entry of the prerequisite table: `(type, instance) -> requirements`.
#[derive(Debug, Clone, Copy)]
pub struct PrerequisiteRule {
    pub machine: MachineType,
    pub selector: InstanceSelector,
    pub requires: &'static [Requirement],
    /// Player-facing summary shown next to a disabled build button.
    pub note: &'static str,
}

static RULES: [PrerequisiteRule; 3] = [
    PrerequisiteRule {
        machine: MachineType::Reactor,
        selector: InstanceSelector::Nth(3),
        requires: &[
            Requirement::Owns {
                machine: MachineType::Incubator,
                at_least: 1,
            },
            Requirement::Owns {
                machine: MachineType::FomoHit,
                at_least: 1,
            },
        ],
        note: "Requires Incubator & FOMO HIT",
    },
    PrerequisiteRule {
        machine: MachineType::Incubator,
        selector: InstanceSelector::Every,
        requires: &[
            Requirement::ReachedMaxLevel {
                machine: MachineType::CatsLair,
            },
            Requirement::ReachedMaxLevel {
                machine: MachineType::Reactor,
            },
        ],
        note: "Requires max level machines",
    },
    PrerequisiteRule {
        machine: MachineType::FomoHit,
        selector: InstanceSelector::Every,
        requires: &[
            Requirement::Owns {
                machine: MachineType::CatsLair,
                at_least: 1,
            },
            Requirement::Owns {
                machine: MachineType::Reactor,
                at_least: 1,
            },
            Requirement::Owns {
                machine: MachineType::Amplifier,
                at_least: 1,
            },
            Requirement::Owns {
                machine: MachineType::Incubator,
                at_least: 1,
            },
            Requirement::ReachedLevel {
                machine: MachineType::CatsLair,
                level: 3,
            },
            Requirement::ReachedLevel {
                machine: MachineType::Reactor,
                level: 3,
            },
            Requirement::ReachedLevel {
                machine: MachineType::Amplifier,
                level: 3,
            },
        ],
        note: "Build all other machines first",
    },
];

/// Read-only view over the machine descriptor and prerequisite tables.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    rules: &'static [PrerequisiteRule],
}

impl Default for Catalog {
    fn default() -> Self {
        Self { rules: &RULES }
    }
}

impl Catalog {
    /// Swaps the prerequisite table, keeping the descriptors.
    pub fn with_rules(rules: &'static [PrerequisiteRule]) -> Self {
        Self { rules }
    }

    pub fn descriptors(&self) -> &'static [MachineTypeDescriptor] {
        &DESCRIPTORS
    }

    pub fn descriptor(&self, machine: MachineType) -> &'static MachineTypeDescriptor {
        // DESCRIPTORS is declared in `MachineType` variant order.
        &DESCRIPTORS[machine as usize]
    }

    /// Rules guarding the next instance of `machine`, given how many are owned.
    pub fn rules_for(
        &self,
        machine: MachineType,
        owned: usize,
    ) -> impl Iterator<Item = &'static PrerequisiteRule> {
        let rules = self.rules;
        rules
            .iter()
            .filter(move |r| r.machine == machine && r.selector.applies(owned))
    }

    /// Build cost when `owned` instances of the type already exist.
    pub fn cost_of(&self, machine: MachineType, owned: usize) -> ResourceBundle {
        let d = self.descriptor(machine);
        d.base_cost().scaled(d.build_scaling.factor(owned))
    }

    /// Cost of going from `level` to `level + 1`; `None` at the cap.
    pub fn upgrade_cost(&self, machine: MachineType, level: u32) -> Option<ResourceBundle> {
        let d = self.descriptor(machine);
        if level >= d.max_level {
            return None;
        }
        Some(d.base_cost().scaled(f64::from(level + 1)))
    }

    pub fn max_level(&self, machine: MachineType) -> u32 {
        self.descriptor(machine).max_level
    }

    pub fn prerequisite_satisfied(&self, machine: MachineType, registry: &MachineRegistry) -> bool {
        let owned = registry.count_of(machine);
        self.rules_for(machine, owned)
            .all(|rule| rule.requires.iter().all(|req| req.is_met(self, registry)))
    }
}
