//! Command Handlers module
//!
//! Handlers that orchestrate wallet operations over the store and the
//! payment providers.

mod account_handler;
mod checkout_handler;
mod commands;
mod deposit_handler;
mod transfer_handler;


pub use account_handler::AccountHandler;
pub use checkout_handler::CheckoutHandler;
pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use transfer_handler::TransferHandler;
