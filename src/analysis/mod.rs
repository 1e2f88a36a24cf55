/// Numerical layer: derived fields, mode partitioning, fallback and energy.
///
/// ```text
///   FieldBundle ──► derived (phase, magnitude)
///        │
///   mode arrays ──► partition ──► Decomposition::{Usable, Degenerate}
///        │                              │
///        │                    (degenerate / missing)
///        │                              ▼
///        └─────────────────────►  synthetic
///                                       │
///                                       ▼
///                                    energy
/// ```

pub mod derived;
pub mod energy;
pub mod partition;
pub mod synthetic;
