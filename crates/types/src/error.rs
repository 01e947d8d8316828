//! Validation errors for domain values.

use thiserror::Error;

use crate::amount::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Insufficient balance for participant {idx}: available {available}, requested {requested}")]
    InsufficientBalance {
        idx: usize,
        available: Amount,
        requested: Amount,
    },

    #[error("Participant index {idx} out of range for {count} participants")]
    ParticipantOutOfRange { idx: usize, count: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Asset mismatch: expected {expected}, found {found}")]
    AssetMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, TypesError>;
