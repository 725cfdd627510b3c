//! ---
//! rsim_section: "01-core-functionality"
//! rsim_subsection: "module"
//! rsim_type: "source"
//! rsim_scope: "code"
//! rsim_description: "Runtime helpers supporting the tick driver."
//! rsim_version: "v0.1.0"
//! rsim_owner: "tbd"
//! ---
//! Tick scheduling for the simulator runtime.

pub mod scheduling;

pub use scheduling::RateLimiter;
