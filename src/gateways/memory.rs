//! In-memory gateways
//!
//! Stand-ins for the hosted services, used by the test suite and by the
//! `sandbox` build so the server can run without external credentials. Each
//! fake records the calls it receives and can be told to fail.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::aggregation::{AggregationError, AggregationGateway};
use super::identity::{AuthError, IdentityGateway};
use super::rail::{PaymentRailGateway, RailError};
use super::store::{BankAccountStore, StorageError};
use crate::models::{
    AccountSnapshot, BankAccountRecord, LinkToken, NewBankAccount, ProcessorToken, Session,
    TokenExchange, User,
};

// ============================================================================
// Identity
// ============================================================================

struct StoredAccount {
    user: User,
    password: String,
}

/// Identity service held in memory
pub struct InMemoryIdentity {
    accounts: Mutex<HashMap<String, StoredAccount>>,
    sessions: Mutex<HashMap<String, String>>,
    enroll_rail_customers: bool,
    unavailable: AtomicBool,
}

impl InMemoryIdentity {
    /// New accounts are enrolled at the payment rail immediately
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            enroll_rail_customers: true,
            unavailable: AtomicBool::new(false),
        }
    }

    /// New accounts have no rail customer id
    pub fn without_rail_enrollment() -> Self {
        Self {
            enroll_rail_customers: false,
            ..Self::new()
        }
    }

    /// Make every call fail as if the service were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn check_available(&self) -> Result<(), AuthError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("identity service offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityGateway for InMemoryIdentity {
    async fn create_account(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        self.check_available()?;
        let mut accounts = self.accounts.lock().await;
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(AuthError::AccountExists(email.to_string()));
        }

        let id = Uuid::new_v4().simple().to_string();
        let rail_customer_id = self
            .enroll_rail_customers
            .then(|| format!("customer-{}", id));
        let user = User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            rail_customer_id,
        };
        accounts.insert(
            key,
            StoredAccount {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok(user)
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.check_available()?;
        let accounts = self.accounts.lock().await;
        let account = accounts
            .get(&email.to_lowercase())
            .filter(|account| account.password == password)
            .ok_or(AuthError::InvalidCredentials)?;

        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            user_id: account.user.id.clone(),
            secret: Uuid::new_v4().to_string(),
        };
        self.sessions
            .lock()
            .await
            .insert(session.secret.clone(), session.user_id.clone());
        Ok(session)
    }

    async fn get_account(&self, secret: &str) -> Result<User, AuthError> {
        self.check_available()?;
        let user_id = self
            .sessions
            .lock()
            .await
            .get(secret)
            .cloned()
            .ok_or(AuthError::NotAuthenticated)?;
        self.accounts
            .lock()
            .await
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    async fn delete_session(&self, secret: &str) -> Result<(), AuthError> {
        self.check_available()?;
        self.sessions
            .lock()
            .await
            .remove(secret)
            .map(|_| ())
            .ok_or(AuthError::NotAuthenticated)
    }
}

// ============================================================================
// Aggregation
// ============================================================================

struct Item {
    exchange: TokenExchange,
    accounts: Vec<AccountSnapshot>,
}

/// Aggregation service held in memory
pub struct InMemoryAggregation {
    pending: Mutex<HashMap<String, Item>>,
    items: Mutex<HashMap<String, Vec<AccountSnapshot>>>,
    used_public_tokens: Mutex<HashSet<String>>,
    issued_link_tokens: Mutex<Vec<(String, String)>>,
    accept_any_public_token: bool,
}

impl InMemoryAggregation {
    /// Only public tokens registered with `add_item` can be exchanged
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            used_public_tokens: Mutex::new(HashSet::new()),
            issued_link_tokens: Mutex::new(Vec::new()),
            accept_any_public_token: false,
        }
    }

    /// Any fresh public token links a demo checking account
    pub fn sandbox() -> Self {
        Self {
            accept_any_public_token: true,
            ..Self::new()
        }
    }

    /// Register an item that `public_token` will link
    pub async fn add_item(
        &self,
        public_token: &str,
        access_token: &str,
        item_id: &str,
        accounts: Vec<AccountSnapshot>,
    ) {
        self.pending.lock().await.insert(
            public_token.to_string(),
            Item {
                exchange: TokenExchange {
                    access_token: access_token.to_string(),
                    item_id: item_id.to_string(),
                },
                accounts,
            },
        );
    }

    /// `(user id, link token)` pairs issued so far
    pub async fn issued_link_tokens(&self) -> Vec<(String, String)> {
        self.issued_link_tokens.lock().await.clone()
    }

    fn demo_item() -> Item {
        let suffix = Uuid::new_v4().simple().to_string();
        Item {
            exchange: TokenExchange {
                access_token: format!("access-sandbox-{}", suffix),
                item_id: format!("item-sandbox-{}", suffix),
            },
            accounts: vec![AccountSnapshot {
                account_id: format!("acc-sandbox-{}", suffix),
                name: "Plaid Checking".to_string(),
                official_name: Some("Plaid Gold Standard 0% Interest Checking".to_string()),
                mask: Some("0000".to_string()),
                account_type: Some("depository".to_string()),
                subtype: Some("checking".to_string()),
                available_balance: Some(100.0),
                current_balance: Some(110.0),
                iso_currency_code: Some("USD".to_string()),
            }],
        }
    }
}

impl Default for InMemoryAggregation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregationGateway for InMemoryAggregation {
    async fn create_link_token(&self, user: &User) -> Result<LinkToken, AggregationError> {
        let token = format!("link-sandbox-{}", Uuid::new_v4());
        self.issued_link_tokens
            .lock()
            .await
            .push((user.id.clone(), token.clone()));
        Ok(LinkToken {
            link_token: token,
            expiration: Some(Utc::now() + Duration::hours(4)),
        })
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, AggregationError> {
        if !self.used_public_tokens.lock().await.insert(public_token.to_string()) {
            return Err(AggregationError::Api {
                code: "INVALID_PUBLIC_TOKEN".to_string(),
                message: "public token already exchanged".to_string(),
            });
        }

        let pending = self.pending.lock().await.remove(public_token);
        let item = match pending {
            Some(item) => item,
            None if self.accept_any_public_token => Self::demo_item(),
            None => {
                return Err(AggregationError::Api {
                    code: "INVALID_PUBLIC_TOKEN".to_string(),
                    message: "unknown public token".to_string(),
                })
            }
        };

        self.items
            .lock()
            .await
            .insert(item.exchange.access_token.clone(), item.accounts);
        Ok(item.exchange)
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<AccountSnapshot>, AggregationError> {
        self.items
            .lock()
            .await
            .get(access_token)
            .cloned()
            .ok_or_else(|| AggregationError::Api {
                code: "INVALID_ACCESS_TOKEN".to_string(),
                message: "unknown access token".to_string(),
            })
    }
}

// ============================================================================
// Payment rail
// ============================================================================

/// How the in-memory rail answers funding-source requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RailBehavior {
    /// Register and return a URL
    Register,
    /// Report success with an empty URL
    EmptyUrl,
    /// Reject the funding source
    RejectFundingSource,
    /// Refuse to mint processor tokens
    RejectProcessorToken,
}

/// Payment rail held in memory
pub struct InMemoryRail {
    behavior: RailBehavior,
    base_url: String,
    funding_source_url: Option<String>,
    registrations: Mutex<Vec<(String, String)>>,
    processor_tokens: Mutex<Vec<String>>,
}

impl InMemoryRail {
    pub fn new(behavior: RailBehavior) -> Self {
        Self {
            behavior,
            base_url: "https://api-sandbox.dwolla.com".to_string(),
            funding_source_url: None,
            registrations: Mutex::new(Vec::new()),
            processor_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Answer every successful registration with `url`
    pub fn with_funding_source_url(mut self, url: impl Into<String>) -> Self {
        self.funding_source_url = Some(url.into());
        self
    }

    /// `(customer id, bank name)` pairs registered so far
    pub async fn registrations(&self) -> Vec<(String, String)> {
        self.registrations.lock().await.clone()
    }

    /// Account ids processor tokens were minted for
    pub async fn processor_tokens(&self) -> Vec<String> {
        self.processor_tokens.lock().await.clone()
    }
}

impl Default for InMemoryRail {
    fn default() -> Self {
        Self::new(RailBehavior::Register)
    }
}

#[async_trait]
impl PaymentRailGateway for InMemoryRail {
    async fn create_processor_token(
        &self,
        _access_token: &str,
        account_id: &str,
    ) -> Result<ProcessorToken, RailError> {
        if self.behavior == RailBehavior::RejectProcessorToken {
            return Err(RailError::ProcessorToken("processor token refused".to_string()));
        }
        self.processor_tokens.lock().await.push(account_id.to_string());
        Ok(ProcessorToken(format!("processor-sandbox-{}", Uuid::new_v4())))
    }

    async fn register_funding_source(
        &self,
        customer_id: &str,
        _processor_token: &ProcessorToken,
        bank_name: &str,
    ) -> Result<String, RailError> {
        match self.behavior {
            RailBehavior::RejectFundingSource => {
                Err(RailError::FundingSource("funding source refused".to_string()))
            }
            RailBehavior::EmptyUrl => {
                self.registrations
                    .lock()
                    .await
                    .push((customer_id.to_string(), bank_name.to_string()));
                Ok(String::new())
            }
            _ => {
                self.registrations
                    .lock()
                    .await
                    .push((customer_id.to_string(), bank_name.to_string()));
                Ok(self
                    .funding_source_url
                    .clone()
                    .unwrap_or_else(|| format!("{}/funding-sources/{}", self.base_url, Uuid::new_v4())))
            }
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Bank-account store held in memory
#[derive(Default)]
pub struct InMemoryBankAccountStore {
    records: Mutex<Vec<BankAccountRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryBankAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored record
    pub async fn records(&self) -> Vec<BankAccountRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl BankAccountStore for InMemoryBankAccountStore {
    async fn create_bank_account(&self, new: NewBankAccount) -> Result<BankAccountRecord, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Api {
                status: 503,
                message: "document store offline".to_string(),
            });
        }
        let record = BankAccountRecord::from_new(Uuid::new_v4().simple().to_string(), new, Utc::now());
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn list_bank_accounts(&self, user_id: &str) -> Result<Vec<BankAccountRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_account_id(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BankAccountRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|record| record.user_id == user_id && record.account_id == account_id)
            .cloned())
    }
}
