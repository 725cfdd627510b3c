//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Weighted label selection over discrete distributions."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use rand::Rng;

use crate::{Result, SimError};

/// Discrete distribution over labels, sampled with a single uniform draw.
///
/// Entries keep their insertion order; sampling walks them in that order and
/// subtracts each weight from the scaled draw until the remainder is `<= 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable<L> {
    entries: Vec<(L, f64)>,
    total: f64,
}

impl<L: Copy> WeightTable<L> {
    pub fn new(entries: impl IntoIterator<Item = (L, f64)>) -> Result<Self> {
        let entries: Vec<(L, f64)> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(SimError::EmptyWeightTable);
        }
        for (index, (_, weight)) in entries.iter().enumerate() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(SimError::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
        }
        let total = entries.iter().map(|(_, weight)| weight).sum::<f64>();
        if total <= 0.0 {
            return Err(SimError::ZeroTotalWeight);
        }
        Ok(Self { entries, total })
    }

    /// Draw one label with probability `weight / total`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> L {
        let draw = rng.gen::<f64>() * self.total;
        self.resolve(draw)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    // Drift past the last entry falls back to the first label.
    fn resolve(&self, draw: f64) -> L {
        let mut remainder = draw;
        for (label, weight) in &self.entries {
            remainder -= weight;
            if remainder <= 0.0 {
                return *label;
            }
        }
        self.entries[0].0
    }
}
