//! Iterative repair: the verify/propose loop, prompt templates and reply
//! parsing.

mod agent_loop;
pub mod extract;
pub mod prompts;

pub use agent_loop::{
    LoopStatus, RepairConfig, RepairError, RepairLoop, RepairOutcome, RoundRecord,
};
