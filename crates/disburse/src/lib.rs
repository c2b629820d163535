//! Disbursement orchestration
//!
//! Drives a batch token disbursement through its phases: filter the
//! recipient set, check the current allowance, approve if short, then
//! submit the batch transfer. Planning (`prepare`) is split from execution
//! (`execute`) so a plan can be reviewed before anything touches the chain
//! and execution can be retried independently.

mod orchestrator;
mod plan;

pub use orchestrator::{DisbursePhase, Disburser};
pub use plan::DisbursementPlan;

use thiserror::Error;

use meritdrop_settlement::ChainError;

#[derive(Debug, Error)]
pub enum DisburseError {
    /// Missing or malformed inputs; reported immediately, never retried,
    /// and the machine stays (or returns to) `Idle`.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A chain interaction failed; carries the phase that was executing so
    /// the operator can decide whether to retry.
    #[error("chain failure while {phase}: {source}")]
    Chain {
        phase: DisbursePhase,
        source: ChainError,
    },

    /// The operator abandoned the attempt. Anything already submitted to
    /// the network is not revoked — only the local wait stops.
    #[error("disbursement abandoned by operator")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, DisburseError>;
