//! Repository implementations
//!
//! SQLx-backed implementations of the gateway store traits.

mod bank_account;

pub use bank_account::SqlxBankAccountStore;
