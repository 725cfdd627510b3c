//! ---
//! rsim_section: "11-simulation"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Bounded random walk helpers shared by the health models."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
use rand::Rng;

/// Closed interval a measurement must stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Uniform sample inside the band.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

/// One step of a bounded random walk: `value + U(-step, step) + bias`, clamped.
pub fn bounded_walk<R: Rng + ?Sized>(
    rng: &mut R,
    value: f64,
    step: f64,
    bias: f64,
    band: Band,
) -> f64 {
    let delta = if step > 0.0 {
        rng.gen_range(-step..=step)
    } else {
        0.0
    };
    band.clamp(value + delta + bias)
}

/// Round to one decimal place for reporting.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
