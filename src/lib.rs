//! Wallet Ledger Library
//!
//! Re-exports modules for the server binary, integration testing and the
//! load test tool.

pub mod api;
pub mod domain;
pub mod handlers;
pub mod providers;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::AppError;
pub use domain::{AccountId, Amount, AmountError, Balance, DomainError, OperationContext};
