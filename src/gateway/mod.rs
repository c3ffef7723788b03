//! Gateway module - generation engine and request orchestration

pub mod engine;
pub mod orchestrator;

pub use engine::{EngineStats, GenerationEngine};
pub use orchestrator::{Orchestrator, RequestPhase};
