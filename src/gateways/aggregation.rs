//! Aggregation gateway
//!
//! Link-token issuance, public-token exchange and account listing against the
//! Plaid API. The same client also mints processor tokens, which the payment
//! rail gateway borrows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::AggregationConfig;
use crate::models::{AccountSnapshot, LinkToken, ProcessorToken, TokenExchange, User};

/// Products requested for every link session
pub const LINK_PRODUCTS: &[&str] = &["auth"];
/// Widget language
pub const LINK_LANGUAGE: &str = "en";
/// Countries offered in the widget
pub const LINK_COUNTRY_CODES: &[&str] = &["US"];

/// Error types for aggregation operations
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// The API answered with an error object
    #[error("Aggregation API error {code}: {message}")]
    Api { code: String, message: String },

    /// The item has no accounts to link
    #[error("Item has no accounts")]
    NoAccounts,

    /// Request never produced a usable response
    #[error("Aggregation request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Bank aggregation operations
#[async_trait]
pub trait AggregationGateway: Send + Sync {
    /// Issue a link token scoped to `user`
    async fn create_link_token(&self, user: &User) -> Result<LinkToken, AggregationError>;

    /// Trade a single-use public token for a durable access token
    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, AggregationError>;

    /// List the accounts under the item owning `access_token`
    async fn get_accounts(&self, access_token: &str) -> Result<Vec<AccountSnapshot>, AggregationError>;

    /// First account of the item
    async fn fetch_primary_account(&self, access_token: &str) -> Result<AccountSnapshot, AggregationError> {
        self.get_accounts(access_token)
            .await?
            .into_iter()
            .next()
            .ok_or(AggregationError::NoAccounts)
    }
}

/// Plaid HTTP client
pub struct PlaidClient {
    http: Client,
    base_url: String,
    client_id: String,
    secret: String,
    client_name: String,
}

impl PlaidClient {
    pub fn new(http: Client, config: &AggregationConfig) -> Self {
        Self {
            http,
            base_url: config.api_base_url(),
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            client_name: config.client_name.clone(),
        }
    }

    /// Mint a processor token for `account_id`, handed to the named processor
    pub async fn create_processor_token(
        &self,
        access_token: &str,
        account_id: &str,
        processor: &str,
    ) -> Result<ProcessorToken, AggregationError> {
        let response: ProcessorTokenResponse = self
            .post(
                "/processor/token/create",
                &ProcessorTokenRequest {
                    access_token,
                    account_id,
                    processor,
                },
            )
            .await?;
        Ok(ProcessorToken(response.processor_token))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AggregationError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("PLAID-CLIENT-ID", &self.client_id)
            .header("PLAID-SECRET", &self.secret)
            .json(body)
            .send()
            .await
            .inspect_err(|err| tracing::error!("Aggregation request to {} failed: {}", path, err))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.json::<PlaidErrorBody>().await.unwrap_or_default();
            tracing::warn!(
                "Aggregation request to {} rejected ({}): {} {}",
                path,
                status,
                error.error_type,
                error.error_code
            );
            return Err(AggregationError::Api {
                code: error.error_code,
                message: error.error_message,
            });
        }

        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for PlaidClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaidClient")
            .field("base_url", &self.base_url)
            .field("client_name", &self.client_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AggregationGateway for PlaidClient {
    async fn create_link_token(&self, user: &User) -> Result<LinkToken, AggregationError> {
        let request = LinkTokenRequest::for_user(user, &self.client_name);
        let response: LinkTokenResponse = self.post("/link/token/create", &request).await?;
        Ok(LinkToken {
            link_token: response.link_token,
            expiration: response.expiration,
        })
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, AggregationError> {
        let response: ExchangeResponse = self
            .post("/item/public_token/exchange", &ExchangeRequest { public_token })
            .await?;
        Ok(TokenExchange {
            access_token: response.access_token,
            item_id: response.item_id,
        })
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<AccountSnapshot>, AggregationError> {
        let response: AccountsResponse = self
            .post("/accounts/get", &AccountsRequest { access_token })
            .await?;
        Ok(response.accounts.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LinkTokenUser<'a> {
    client_user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct LinkTokenRequest<'a> {
    client_name: &'a str,
    user: LinkTokenUser<'a>,
    products: &'static [&'static str],
    language: &'static str,
    country_codes: &'static [&'static str],
}

impl<'a> LinkTokenRequest<'a> {
    fn for_user(user: &'a User, client_name: &'a str) -> Self {
        Self {
            client_name,
            user: LinkTokenUser {
                client_user_id: &user.id,
            },
            products: LINK_PRODUCTS,
            language: LINK_LANGUAGE,
            country_codes: LINK_COUNTRY_CODES,
        }
    }
}

#[derive(Deserialize)]
struct LinkTokenResponse {
    link_token: String,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    public_token: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Serialize)]
struct AccountsRequest<'a> {
    access_token: &'a str,
}

#[derive(Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<PlaidAccount>,
}

#[derive(Deserialize)]
struct PlaidBalances {
    available: Option<f64>,
    current: Option<f64>,
    iso_currency_code: Option<String>,
}

#[derive(Deserialize)]
struct PlaidAccount {
    account_id: String,
    name: String,
    official_name: Option<String>,
    mask: Option<String>,
    #[serde(rename = "type")]
    account_type: Option<String>,
    subtype: Option<String>,
    balances: Option<PlaidBalances>,
}

impl From<PlaidAccount> for AccountSnapshot {
    fn from(account: PlaidAccount) -> Self {
        let (available_balance, current_balance, iso_currency_code) = match account.balances {
            Some(b) => (b.available, b.current, b.iso_currency_code),
            None => (None, None, None),
        };
        AccountSnapshot {
            account_id: account.account_id,
            name: account.name,
            official_name: account.official_name,
            mask: account.mask,
            account_type: account.account_type,
            subtype: account.subtype,
            available_balance,
            current_balance,
            iso_currency_code,
        }
    }
}

#[derive(Serialize)]
struct ProcessorTokenRequest<'a> {
    access_token: &'a str,
    account_id: &'a str,
    processor: &'a str,
}

#[derive(Deserialize)]
struct ProcessorTokenResponse {
    processor_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlaidErrorBody {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_message: String,
}
