//! Bank-link orchestrator
//!
//! Drives one account-linking transaction from a public token to a persisted
//! bank-account record:
//!
//! ```text
//! Idle -> TokenExchanged -> ProcessorTokenIssued -> FundingSourceRegistered -> Persisted
//! ```
//!
//! Any step may abort. A failure carries the last stage reached together with
//! the typed cause. Steps run strictly in order and none is retried. Side
//! effects of completed steps are not undone: a storage failure after the
//! funding source was registered leaves that funding source at the rail.

use std::fmt;
use std::sync::Arc;

use crate::gateways::{
    AggregationError, AggregationGateway, BankAccountStore, PaymentRailGateway, RailError,
    StorageError,
};
use crate::models::{BankAccountRecord, FundingSourceUrl, LinkToken, NewBankAccount, User};
use crate::services::accounts::AccountsService;
use crate::services::shareable_id::encode_id;

/// Progress of a linking transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    Idle,
    TokenExchanged,
    ProcessorTokenIssued,
    FundingSourceRegistered,
    Persisted,
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkStage::Idle => "idle",
            LinkStage::TokenExchanged => "token_exchanged",
            LinkStage::ProcessorTokenIssued => "processor_token_issued",
            LinkStage::FundingSourceRegistered => "funding_source_registered",
            LinkStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Cause of an aborted link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Rail(#[from] RailError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Aborted linking transaction
#[derive(Debug, thiserror::Error)]
#[error("Bank link aborted after {stage}: {cause}")]
pub struct LinkFailure {
    /// Last stage completed before the failure
    pub stage: LinkStage,
    #[source]
    pub cause: LinkError,
}

impl LinkFailure {
    fn at(stage: LinkStage, cause: impl Into<LinkError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// Sequences the aggregation, rail and store gateways
pub struct BankLinkService {
    aggregation: Arc<dyn AggregationGateway>,
    rail: Arc<dyn PaymentRailGateway>,
    store: Arc<dyn BankAccountStore>,
    accounts: Arc<AccountsService>,
}

impl BankLinkService {
    pub fn new(
        aggregation: Arc<dyn AggregationGateway>,
        rail: Arc<dyn PaymentRailGateway>,
        store: Arc<dyn BankAccountStore>,
        accounts: Arc<AccountsService>,
    ) -> Self {
        Self {
            aggregation,
            rail,
            store,
            accounts,
        }
    }

    /// Issue a link token for `user`. Each call mints a fresh token.
    pub async fn issue_link_token(&self, user: &User) -> Result<LinkToken, AggregationError> {
        let token = self
            .aggregation
            .create_link_token(user)
            .await
            .inspect_err(|err| tracing::error!("Link token issuance failed for user {}: {}", user.id, err))?;
        tracing::info!("Link token issued for user {}", user.id);
        Ok(token)
    }

    /// Link the bank account behind `public_token` to `user`
    pub async fn link_bank_account(
        &self,
        user: &User,
        public_token: &str,
    ) -> Result<BankAccountRecord, LinkFailure> {
        let result = self.run(user, public_token).await;
        if let Err(failure) = &result {
            tracing::error!(
                "Bank link for user {} aborted after {}: {}",
                user.id,
                failure.stage,
                failure.cause
            );
        }
        result
    }

    async fn run(&self, user: &User, public_token: &str) -> Result<BankAccountRecord, LinkFailure> {
        let mut stage = LinkStage::Idle;

        let exchange = self
            .aggregation
            .exchange_public_token(public_token)
            .await
            .map_err(|err| LinkFailure::at(stage, err))?;
        let account = self
            .aggregation
            .fetch_primary_account(&exchange.access_token)
            .await
            .map_err(|err| LinkFailure::at(stage, err))?;
        stage = LinkStage::TokenExchanged;
        tracing::debug!("Link {}: item {} primary account resolved", stage, exchange.item_id);

        let processor_token = self
            .rail
            .create_processor_token(&exchange.access_token, &account.account_id)
            .await
            .map_err(|err| LinkFailure::at(stage, err))?;
        stage = LinkStage::ProcessorTokenIssued;
        tracing::debug!("Link {}: item {}", stage, exchange.item_id);

        let customer_id = user
            .rail_customer_id
            .as_deref()
            .ok_or_else(|| LinkFailure::at(stage, RailError::MissingCustomer))?;
        let url = self
            .rail
            .register_funding_source(customer_id, &processor_token, &account.name)
            .await
            .map_err(|err| LinkFailure::at(stage, err))?;
        let funding_source_url = FundingSourceUrl::new(url)
            .ok_or_else(|| LinkFailure::at(stage, RailError::EmptyFundingSourceUrl))?;
        stage = LinkStage::FundingSourceRegistered;
        tracing::debug!("Link {}: {}", stage, funding_source_url);

        let record = self
            .store
            .create_bank_account(NewBankAccount {
                user_id: user.id.clone(),
                bank_id: exchange.item_id,
                shareable_id: encode_id(&account.account_id),
                account_id: account.account_id,
                access_token: exchange.access_token,
                funding_source_url: funding_source_url.into_inner(),
            })
            .await
            .map_err(|err| {
                tracing::warn!(
                    "Funding source left without a bank account record for user {}",
                    user.id
                );
                LinkFailure::at(stage, err)
            })?;
        stage = LinkStage::Persisted;
        tracing::info!("Bank account {} linked for user {} ({})", record.id, user.id, stage);

        self.accounts.invalidate(&user.id).await;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::gateways::memory::{InMemoryAggregation, InMemoryBankAccountStore, InMemoryRail, RailBehavior};
    use crate::models::AccountSnapshot;
    use crate::services::shareable_id::decode_id;

    fn user_with_customer(customer: Option<&str>) -> User {
        User {
            id: "user-1".to_string(),
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            rail_customer_id: customer.map(str::to_string),
        }
    }

    fn checking(account_id: &str) -> AccountSnapshot {
        AccountSnapshot {
            account_id: account_id.to_string(),
            name: "Plaid Checking".to_string(),
            official_name: None,
            mask: Some("0000".to_string()),
            account_type: Some("depository".to_string()),
            subtype: Some("checking".to_string()),
            available_balance: Some(100.0),
            current_balance: Some(110.0),
            iso_currency_code: Some("USD".to_string()),
        }
    }

    struct Harness {
        aggregation: Arc<InMemoryAggregation>,
        rail: Arc<InMemoryRail>,
        store: Arc<InMemoryBankAccountStore>,
        accounts: Arc<AccountsService>,
        service: BankLinkService,
    }

    async fn harness(behavior: RailBehavior) -> Harness {
        let aggregation = Arc::new(InMemoryAggregation::new());
        aggregation
            .add_item(
                "public-sandbox-1",
                "access-sandbox-1",
                "item-1",
                vec![checking("acc-1"), checking("acc-2")],
            )
            .await;
        aggregation
            .add_item("public-empty", "access-empty", "item-empty", vec![])
            .await;
        let rail = Arc::new(InMemoryRail::new(behavior));
        let store = Arc::new(InMemoryBankAccountStore::new());
        let accounts = Arc::new(AccountsService::new(
            store.clone(),
            aggregation.clone(),
            Arc::new(MemoryCache::new()),
        ));
        let service = BankLinkService::new(aggregation.clone(), rail.clone(), store.clone(), accounts.clone());
        Harness {
            aggregation,
            rail,
            store,
            accounts,
            service,
        }
    }

    #[tokio::test]
    async fn test_link_token_scoped_to_caller() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        let first = h.service.issue_link_token(&user).await.unwrap();
        let second = h.service.issue_link_token(&user).await.unwrap();
        assert_ne!(first.link_token, second.link_token);

        let issued = h.aggregation.issued_link_tokens().await;
        assert_eq!(issued.len(), 2);
        assert!(issued.iter().all(|(user_id, _)| user_id == "user-1"));
    }

    #[tokio::test]
    async fn test_successful_link_persists_record() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        let record = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap();

        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.bank_id, "item-1");
        assert_eq!(record.account_id, "acc-1");
        assert_eq!(record.access_token, "access-sandbox-1");
        assert!(!record.funding_source_url.is_empty());
        assert_eq!(decode_id(&record.shareable_id).as_deref(), Some("acc-1"));

        assert_eq!(h.store.records().await.len(), 1);
        assert_eq!(
            h.rail.registrations().await,
            vec![("cust-1".to_string(), "Plaid Checking".to_string())]
        );
        assert_eq!(h.rail.processor_tokens().await, vec!["acc-1".to_string()]);
    }

    #[tokio::test]
    async fn test_record_carries_exact_rail_and_aggregation_values() {
        let aggregation = Arc::new(InMemoryAggregation::new());
        aggregation
            .add_item("public-xyz", "access-abc", "item-xyz", vec![checking("acc-1")])
            .await;
        let rail = Arc::new(InMemoryRail::default().with_funding_source_url("https://rail/funding/1"));
        let store = Arc::new(InMemoryBankAccountStore::new());
        let accounts = Arc::new(AccountsService::new(
            store.clone(),
            aggregation.clone(),
            Arc::new(MemoryCache::new()),
        ));
        let service = BankLinkService::new(aggregation, rail, store.clone(), accounts);
        let user = user_with_customer(Some("cust-1"));

        let record = service.link_bank_account(&user, "public-xyz").await.unwrap();

        assert_eq!(record.funding_source_url, "https://rail/funding/1");
        assert_eq!(record.access_token, "access-abc");
        assert_eq!(record.bank_id, "item-xyz");

        let stored = store.records().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].funding_source_url, "https://rail/funding/1");
        assert_eq!(stored[0].access_token, "access-abc");
    }

    #[tokio::test]
    async fn test_successful_link_invalidates_accounts_view() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        assert!(h.accounts.list(&user).await.unwrap().is_empty());
        h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap();
        assert_eq!(h.accounts.list(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_funding_source_url_aborts() {
        let h = harness(RailBehavior::EmptyUrl).await;
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::ProcessorTokenIssued);
        assert!(matches!(failure.cause, LinkError::Rail(RailError::EmptyFundingSourceUrl)));
        assert!(h.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_rail_customer_aborts_before_registration() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(None);

        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::ProcessorTokenIssued);
        assert!(matches!(failure.cause, LinkError::Rail(RailError::MissingCustomer)));
        assert!(h.rail.registrations().await.is_empty());
        assert!(h.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_failure_aborts_at_idle() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-unknown").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::Idle);
        assert!(matches!(failure.cause, LinkError::Aggregation(AggregationError::Api { .. })));
        assert!(h.rail.processor_tokens().await.is_empty());
    }

    #[tokio::test]
    async fn test_item_without_accounts_aborts_at_idle() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-empty").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::Idle);
        assert!(matches!(failure.cause, LinkError::Aggregation(AggregationError::NoAccounts)));
    }

    #[tokio::test]
    async fn test_public_token_cannot_be_replayed() {
        let h = harness(RailBehavior::Register).await;
        let user = user_with_customer(Some("cust-1"));

        h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap();
        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::Idle);
        assert_eq!(h.store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_processor_token_failure() {
        let h = harness(RailBehavior::RejectProcessorToken).await;
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::TokenExchanged);
        assert!(matches!(failure.cause, LinkError::Rail(RailError::ProcessorToken(_))));
    }

    #[tokio::test]
    async fn test_funding_source_rejection() {
        let h = harness(RailBehavior::RejectFundingSource).await;
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::ProcessorTokenIssued);
        assert!(matches!(failure.cause, LinkError::Rail(RailError::FundingSource(_))));
        assert!(h.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_funding_source_orphaned() {
        let h = harness(RailBehavior::Register).await;
        h.store.set_fail_writes(true);
        let user = user_with_customer(Some("cust-1"));

        let failure = h.service.link_bank_account(&user, "public-sandbox-1").await.unwrap_err();

        assert_eq!(failure.stage, LinkStage::FundingSourceRegistered);
        assert!(matches!(failure.cause, LinkError::Storage(_)));
        assert_eq!(h.rail.registrations().await.len(), 1);
        assert!(h.store.records().await.is_empty());
    }

    #[test]
    fn test_failure_message_names_stage() {
        let failure = LinkFailure::at(LinkStage::ProcessorTokenIssued, RailError::MissingCustomer);
        assert_eq!(
            failure.to_string(),
            "Bank link aborted after processor_token_issued: User has no payment rail customer id"
        );
    }
}
