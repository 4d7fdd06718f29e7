//! # mirage-engine
//!
//! The adaptive deception pipeline: deception responder, evidence trigger,
//! evolution engine, and the per-request orchestration that ties them to the
//! firewall and the stores in `mirage-core`.
//!
//! All external collaborators (text generator, evidence capture) sit behind
//! traits and are injected at construction, so the pipeline itself carries
//! no hidden global state.

pub mod artifact;
pub mod error;
pub mod evidence;
pub mod evolution;
pub mod generator;
pub mod pipeline;
pub mod prompts;
pub mod responder;

pub use error::{EngineError, Result};
