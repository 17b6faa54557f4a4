//! Mapping execution and pipeline orchestration
//!
//! The [`Engine`] moves the entities of one mapping from a source store,
//! through a [`TransformChain`], into a target store. The [`Pipeline`]
//! runs mappings in order with retries and can resume an unfinished run
//! from its [`RunLog`].

mod engine;
mod pipeline;
mod run_log;
mod transform;

pub use engine::{Engine, EntityReport, EntityState, MappingReport};
pub use pipeline::{
    ExecutionPlan, MappingOutcome, Pipeline, PipelineReport, PipelineState, PlanStep, RetryMode,
};
pub use run_log::{MappingRecord, ResumePoint, RunLog, RunRecord};
pub use transform::{TransformChain, Transformer};
