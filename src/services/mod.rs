//! Business logic layer
//!
//! - `auth` - sign-up, sign-in, session lookup, sign-out
//! - `bank_link` - the account-linking transaction
//! - `accounts` - cached per-user account views
//! - `shareable_id` - reversible URL-safe account id encoding

pub mod accounts;
pub mod auth;
pub mod bank_link;
pub mod shareable_id;

pub use accounts::{AccountsError, AccountsService};
pub use auth::AuthService;
pub use bank_link::{BankLinkService, LinkError, LinkFailure, LinkStage};
