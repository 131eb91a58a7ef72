//! keel-health — the post-swap health gate.
//!
//! ```text
//! HealthProbe::poll
//!   ├── http_probe() → ProbeResult (Healthy | Degraded | Failed)
//!   ├── evaluate(): every value in the JSON report must be "working"
//!   └── sleep(interval) until healthy or the timeout elapses
//! ```
//!
//! The orchestrator depends on the [`HealthGate`] trait so tests can swap
//! in a scripted gate.

pub mod checker;
pub mod gate;

pub use checker::{HealthEndpoint, HealthError, ProbeResult, WORKING, evaluate, http_probe};
pub use gate::{HealthGate, HealthProbe, await_healthy};
