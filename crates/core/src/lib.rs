// Core engine for weir: declarative workflow execution

pub mod engine;
pub mod error;
pub mod steps;
pub mod types;
pub mod workflow;

pub use engine::WorkflowEngine;
pub use error::{EngineError, EngineResult};
pub use types::*;
