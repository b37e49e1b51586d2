//! External service gateways
//!
//! Every hosted collaborator sits behind a trait so the services can be
//! exercised against in-memory fakes:
//! - `IdentityGateway` - accounts and sessions (Appwrite)
//! - `AggregationGateway` - link tokens, token exchange, accounts (Plaid)
//! - `PaymentRailGateway` - processor tokens and funding sources (Dwolla)
//! - `BankAccountStore` - bank-account records (Appwrite databases or SQLite)

pub mod aggregation;
pub mod appwrite;
pub mod identity;
#[cfg(any(test, feature = "sandbox"))]
pub mod memory;
pub mod rail;
pub mod store;

use anyhow::{Context, Result};
use std::sync::Arc;

pub use aggregation::{AggregationError, AggregationGateway, PlaidClient};
pub use appwrite::AppwriteClient;
pub use identity::{AppwriteIdentityGateway, AuthError, IdentityGateway};
pub use rail::{DwollaRailGateway, PaymentRailGateway, RailError};
pub use store::{AppwriteBankAccountStore, BankAccountStore, StorageError};

use crate::config::{Config, StoreDriver};
use crate::db::{self, repositories::SqlxBankAccountStore};

/// The set of gateways the services are built from
#[derive(Clone)]
pub struct Gateways {
    pub identity: Arc<dyn IdentityGateway>,
    pub aggregation: Arc<dyn AggregationGateway>,
    pub rail: Arc<dyn PaymentRailGateway>,
    pub store: Arc<dyn BankAccountStore>,
}

impl Gateways {
    /// Gateways talking to the hosted services named in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        let http = config.http.build_client()?;
        let appwrite = AppwriteClient::new(http.clone(), &config.identity);
        let plaid = Arc::new(PlaidClient::new(http.clone(), &config.aggregation));

        let store: Arc<dyn BankAccountStore> = match config.store.driver {
            StoreDriver::Appwrite => AppwriteBankAccountStore::boxed(
                appwrite.clone(),
                config.store.database_id.clone(),
                config.store.bank_collection_id.clone(),
            ),
            StoreDriver::Sqlite => {
                let pool = db::create_pool(&config.store.sqlite_url).await?;
                db::migrations::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                SqlxBankAccountStore::boxed(pool)
            }
        };

        tracing::info!(
            "Gateways configured: aggregation {:?}, rail {}, store {:?}",
            config.aggregation.environment,
            config.rail.base_url,
            config.store.driver
        );

        Ok(Self {
            identity: Arc::new(
                AppwriteIdentityGateway::new(appwrite)
                    .with_user_collection(&config.store.database_id, &config.store.user_collection_id),
            ),
            aggregation: plaid.clone(),
            rail: DwollaRailGateway::boxed(plaid, http, &config.rail),
            store,
        })
    }

    /// In-memory gateways, no external services required
    #[cfg(any(test, feature = "sandbox"))]
    pub fn sandbox() -> Self {
        use memory::{InMemoryAggregation, InMemoryBankAccountStore, InMemoryIdentity, InMemoryRail};

        Self {
            identity: Arc::new(InMemoryIdentity::new()),
            aggregation: Arc::new(InMemoryAggregation::sandbox()),
            rail: Arc::new(InMemoryRail::default()),
            store: Arc::new(InMemoryBankAccountStore::new()),
        }
    }
}
