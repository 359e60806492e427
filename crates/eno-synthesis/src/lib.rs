//! eno-synthesis
//!
//! One synthesis attempt end to end: guard against stale or canceled
//! attempts, gather the synthesizer's inputs, run the synthesizer
//! process, validate and slice its output, and commit the result into the
//! composition's status slots.

pub mod env;
pub mod error;
pub mod executor;
pub mod handler;

pub use crate::env::SynthesisEnv;
pub use crate::error::SynthesisError;
pub use crate::executor::{
    inputs_out_of_lockstep, skip_synthesis, Executor, SkipReason, SynthesisOutcome,
};
pub use crate::handler::{ProcessHandler, SynthesizerHandler, DEFAULT_COMMAND, DEFAULT_EXEC_TIMEOUT};
