use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "tcorvax")]
    TCorvax,
    #[serde(rename = "catNips")]
    CatNips,
    #[serde(rename = "energy")]
    Energy,
    #[serde(rename = "eggs")]
    Eggs,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::TCorvax,
        ResourceKind::CatNips,
        ResourceKind::Energy,
        ResourceKind::Eggs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::TCorvax => "tcorvax",
            ResourceKind::CatNips => "catNips",
            ResourceKind::Energy => "energy",
            ResourceKind::Eggs => "eggs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::TCorvax => "TCorvax",
            ResourceKind::CatNips => "CatNips",
            ResourceKind::Energy => "Energy",
            ResourceKind::Eggs => "Eggs",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ResourceKind::TCorvax => "💎",
            ResourceKind::CatNips => "🐱",
            ResourceKind::Energy => "⚡",
            ResourceKind::Eggs => "🥚",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Resource kind → amount. Kinds that are absent count as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceBundle(BTreeMap<ResourceKind, f64>);

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResourceKind, amount: f64) -> Self {
        self.set(kind, amount);
        self
    }

    pub fn set(&mut self, kind: ResourceKind, amount: f64) {
        self.0.insert(kind, amount);
    }

    pub fn get(&self, kind: ResourceKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }

    /// Multiplies every entry and rounds up to whole units.
    pub fn scaled(&self, factor: f64) -> Self {
        Self(
            self.0
                .iter()
                .map(|(k, v)| (*k, (v * factor).ceil()))
                .collect(),
        )
    }
}

impl FromIterator<(ResourceKind, f64)> for ResourceBundle {
    fn from_iter<I: IntoIterator<Item = (ResourceKind, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compact cost label used on build/upgrade buttons, e.g. `💎10 🐱5`.
impl fmt::Display for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Free");
        }
        let mut first = true;
        for (kind, amount) in self.iter().filter(|(_, a)| *a != 0.0) {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}{}", kind.icon(), format_amount(amount))?;
        }
        Ok(())
    }
}

/// Current quantities of the four resources. Amounts never go negative once
/// the ledger is owned by an [`crate::Engine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLedger {
    tcorvax: f64,
    cat_nips: f64,
    energy: f64,
    eggs: f64,
}

impl ResourceLedger {
    pub fn new(tcorvax: f64, cat_nips: f64, energy: f64, eggs: f64) -> Self {
        Self {
            tcorvax,
            cat_nips,
            energy,
            eggs,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::TCorvax => self.tcorvax,
            ResourceKind::CatNips => self.cat_nips,
            ResourceKind::Energy => self.energy,
            ResourceKind::Eggs => self.eggs,
        }
    }

    fn slot(&mut self, kind: ResourceKind) -> &mut f64 {
        match kind {
            ResourceKind::TCorvax => &mut self.tcorvax,
            ResourceKind::CatNips => &mut self.cat_nips,
            ResourceKind::Energy => &mut self.energy,
            ResourceKind::Eggs => &mut self.eggs,
        }
    }

    pub fn affordable(&self, cost: &ResourceBundle) -> bool {
        cost.iter()
            .all(|(kind, amount)| !amount.is_nan() && self.get(kind) >= amount)
    }

    /// Per-kind amounts still missing to pay `cost`; empty when affordable.
    pub fn shortfall(&self, cost: &ResourceBundle) -> ResourceBundle {
        cost.iter()
            .filter_map(|(kind, amount)| {
                let have = self.get(kind);
                (amount.is_nan() || have < amount).then(|| (kind, amount - have))
            })
            .collect()
    }

    /// All-or-nothing: either every entry is subtracted or nothing changes.
    pub fn deduct(&mut self, cost: &ResourceBundle) -> Result<(), EngineError> {
        if !self.affordable(cost) {
            return Err(EngineError::InsufficientResources {
                missing: self.shortfall(cost),
            });
        }
        for (kind, amount) in cost.iter() {
            let slot = self.slot(kind);
            *slot = (*slot - amount.max(0.0)).max(0.0);
        }
        Ok(())
    }

    /// Adds production output. Non-finite and non-positive entries are ignored;
    /// balances saturate at `f64::MAX`.
    pub fn credit(&mut self, income: &ResourceBundle) {
        for (kind, amount) in income.iter() {
            if amount.is_finite() && amount > 0.0 {
                let slot = self.slot(kind);
                *slot = (*slot + amount).min(f64::MAX);
            }
        }
    }

    /// Clamps negative and non-finite amounts to zero. Returns how many were clamped.
    pub fn normalize(&mut self) -> usize {
        let mut clamped = 0;
        for kind in ResourceKind::ALL {
            let slot = self.slot(kind);
            if !slot.is_finite() || *slot < 0.0 {
                *slot = 0.0;
                clamped += 1;
            }
        }
        clamped
    }
}

impl From<&ResourceBundle> for ResourceLedger {
    fn from(bundle: &ResourceBundle) -> Self {
        Self::new(
            bundle.get(ResourceKind::TCorvax),
            bundle.get(ResourceKind::CatNips),
            bundle.get(ResourceKind::Energy),
            bundle.get(ResourceKind::Eggs),
        )
    }
}

/// Short display form: at most one decimal, K/M/B/T above a thousand.
/// Display only; never feed the result back into affordability checks.
pub fn format_amount(value: f64) -> String {
    const SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

    if !value.is_finite() {
        return "0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let mut scaled = value.abs();
    let mut tier = 0;
    while scaled >= 1000.0 && tier < SUFFIXES.len() - 1 {
        scaled /= 1000.0;
        tier += 1;
    }
    let mut rounded = (scaled * 10.0).round() / 10.0;
    if rounded >= 1000.0 && tier < SUFFIXES.len() - 1 {
        tier += 1;
        rounded = (rounded / 100.0).round() / 10.0;
    }
    if rounded == 0.0 {
        return "0".to_string();
    }

    let mut text = format!("{rounded:.1}");
    if text.ends_with(".0") {
        text.truncate(text.len() - 2);
    }
    format!("{sign}{text}{}", SUFFIXES[tier])
}
