use crate::domain::payment::PaymentStatus;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShiftpayError>;

#[derive(Error, Debug)]
pub enum ShiftpayError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Illegal transition: cannot {action} payment {payment} in {status} state")]
    IllegalTransition {
        payment: String,
        status: PaymentStatus,
        action: &'static str,
    },
    #[error("Insufficient funds: payer {payer} has {available}, {required} required")]
    InsufficientFunds {
        payer: u32,
        available: Decimal,
        required: Decimal,
    },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Collaborator error: {0}")]
    Collaborator(String),
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}
