//! MeritDrop Settlement
//!
//! Chain client for token approval and batch disbursement.
//!
//! ## Disbursement flow (approve → transfer)
//!
//! 1. **Allowance check**: read `allowance(operator, disburse_contract)` on
//!    the token. Fresh on every attempt, never cached.
//! 2. **Approve**: if the allowance is below the required total, submit
//!    `approve(disburse_contract, total)` and wait for its receipt.
//! 3. **Bulk disburse**: submit `bulkDisburse(token, recipients, amounts,
//!    total)` on the disbursement contract, which pulls the pre-approved
//!    total and fans it out to every recipient in one transaction.
//!
//! Supports two modes:
//! - **Mock Mode**: for development/testing without a chain. State is
//!   tracked in-memory and receipts resolve immediately.
//! - **Live Mode**: JSON-RPC calls (`eth_call`, `eth_sendTransaction`,
//!   `eth_getTransactionReceipt`); signing is delegated to the connected
//!   node's operator account.

pub mod abi;
mod client;

pub use client::{ChainConfig, ChainMode, MockDisbursal, TokenClient};

use std::time::Duration;

use thiserror::Error;

use meritdrop_core::Address;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("malformed RPC response: {0}")]
    Decode(String),

    #[error("no receipt for transaction {0} within {1:?}")]
    ReceiptTimeout(String, Duration),

    #[error("unknown token {0}")]
    UnknownToken(Address),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Transaction receipt as surfaced to callers.
///
/// `success` is the on-chain execution status: a mined-but-reverted
/// transaction yields `success == false`, which callers must treat as a
/// failure even though the transaction confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: meritdrop_core::TxHash,
    pub success: bool,
    pub confirmations: u64,
}
