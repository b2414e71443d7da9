//! Core evaluation engine for flagd-compatible feature flags: a
//! JSON-Logic interpreter with domain-specific targeting operators, a
//! flag resolver, a state compiler that precomputes a pre-evaluation
//! cache and per-flag required-context-key sets, and a facade tying them
//! together behind a single-writer/multi-reader publish pattern.
//!
//! A second, optional transport (`sandbox`, built under the `sandbox`
//! feature or a native `wasm32` target) exposes the same facade through
//! a linear-memory ABI for embedding in non-Rust hosts.

pub mod bucketing;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod logic;
pub mod model;
pub mod resolver;
pub mod value;

#[cfg(any(target_arch = "wasm32", feature = "sandbox"))]
pub mod sandbox;

pub use compiler::{CompiledFlag, CompiledState, StateUpdateResult};
pub use engine::{FlagEvaluator, ValidationMode};
pub use error::EngineError;
pub use model::{ConfigurationDocument, FeatureFlag, FlagState};
pub use resolver::{EvaluationResult, ErrorCode, ResolutionReason};
