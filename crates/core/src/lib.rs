//! MeritDrop core types
//!
//! Shared domain types for the reputation-gated disbursement service:
//! wallet addresses, scored user records, sort parameters, and integer
//! base-unit arithmetic for token amounts.

pub mod types;
pub mod units;

pub use types::{
    Address, AddressParseError, Profile, ScoreField, ScoreSet, SortField, SortOrder, TxHash,
    UserRecord,
};
pub use units::{format_units, parse_units, UnitsError};
