//! Data models
//!
//! This module contains the data structures shared by the gateways, services
//! and HTTP layer:
//! - Identity entities (User, Session, sign-up/sign-in input)
//! - Linking handshake values (LinkToken, TokenExchange, AccountSnapshot, ...)
//! - Persisted bank account records and their client-facing view

mod bank_account;
mod link;
mod session;
mod user;

pub use bank_account::{BankAccountRecord, BankAccountView, NewBankAccount};
pub use link::{AccountSnapshot, FundingSourceUrl, LinkToken, ProcessorToken, TokenExchange};
pub use session::Session;
pub use user::{SignInInput, SignUpInput, User};
