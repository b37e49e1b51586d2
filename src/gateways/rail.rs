//! Payment-rail gateway
//!
//! Turns a linked bank account into a funding source at the payment rail
//! (Dwolla). The processor token is minted by the aggregation service and
//! redeemed by the rail; the rail answers with the funding-source URL in the
//! `Location` header.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::aggregation::{AggregationError, PlaidClient};
use crate::config::RailConfig;
use crate::models::ProcessorToken;

/// Processor name the aggregation service issues tokens for
pub const PROCESSOR: &str = "dwolla";

const HAL_JSON: &str = "application/vnd.dwolla.v1.hal+json";

/// Error types for payment-rail operations
#[derive(Debug, thiserror::Error)]
pub enum RailError {
    /// Processor token could not be minted
    #[error("Processor token creation failed: {0}")]
    ProcessorToken(String),

    /// The rail rejected the funding source
    #[error("Funding source registration failed: {0}")]
    FundingSource(String),

    /// The rail reported success without a funding-source URL
    #[error("Funding source registration returned an empty URL")]
    EmptyFundingSourceUrl,

    /// The user was never enrolled as a rail customer
    #[error("User has no payment rail customer id")]
    MissingCustomer,

    /// Request never produced a usable response
    #[error("Payment rail request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<AggregationError> for RailError {
    fn from(err: AggregationError) -> Self {
        RailError::ProcessorToken(err.to_string())
    }
}

/// Payment-rail operations
#[async_trait]
pub trait PaymentRailGateway: Send + Sync {
    /// Derive a single-use processor token from (access token, account id)
    async fn create_processor_token(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<ProcessorToken, RailError>;

    /// Register a funding source for `customer_id`, returning its URL.
    ///
    /// Not idempotent: calling twice may register two funding sources.
    async fn register_funding_source(
        &self,
        customer_id: &str,
        processor_token: &ProcessorToken,
        bank_name: &str,
    ) -> Result<String, RailError>;
}

/// Dwolla-backed rail gateway
pub struct DwollaRailGateway {
    plaid: Arc<PlaidClient>,
    http: Client,
    base_url: String,
    key: String,
    secret: String,
}

impl DwollaRailGateway {
    pub fn new(plaid: Arc<PlaidClient>, http: Client, config: &RailConfig) -> Self {
        Self {
            plaid,
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            secret: config.secret.clone(),
        }
    }

    pub fn boxed(plaid: Arc<PlaidClient>, http: Client, config: &RailConfig) -> Arc<dyn PaymentRailGateway> {
        Arc::new(Self::new(plaid, http, config))
    }

    /// Fetch a client-credentials application token
    async fn application_token(&self) -> Result<String, RailError> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .basic_auth(&self.key, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .inspect_err(|err| tracing::error!("Rail token request failed: {}", err))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Rail token request rejected ({})", status);
            return Err(RailError::FundingSource(format!(
                "application token request rejected with status {}",
                status
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

impl std::fmt::Debug for DwollaRailGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwollaRailGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FundingSourceRequest<'a> {
    plaid_token: &'a str,
    name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RailErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl PaymentRailGateway for DwollaRailGateway {
    async fn create_processor_token(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<ProcessorToken, RailError> {
        Ok(self
            .plaid
            .create_processor_token(access_token, account_id, PROCESSOR)
            .await?)
    }

    async fn register_funding_source(
        &self,
        customer_id: &str,
        processor_token: &ProcessorToken,
        bank_name: &str,
    ) -> Result<String, RailError> {
        let token = self.application_token().await?;
        let response = self
            .http
            .post(format!("{}/customers/{}/funding-sources", self.base_url, customer_id))
            .bearer_auth(token)
            .header(ACCEPT, HAL_JSON)
            .header(CONTENT_TYPE, HAL_JSON)
            .json(&FundingSourceRequest {
                plaid_token: processor_token.as_str(),
                name: bank_name,
            })
            .send()
            .await
            .inspect_err(|err| tracing::error!("Funding source request failed: {}", err))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.json::<RailErrorBody>().await.unwrap_or_default();
            tracing::error!("Funding source rejected ({}): {}", status, body.code);
            return Err(RailError::FundingSource(body.message));
        }

        location_of(response.headers())
    }
}

fn location_of(headers: &reqwest::header::HeaderMap) -> Result<String, RailError> {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(RailError::EmptyFundingSourceUrl)
}


/// Gateway behaviour against mock Dwolla and Plaid servers
#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::config::AggregationConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FUNDING_SOURCE_PATH: &str = "/customers/cust-1/funding-sources";

    fn gateway(server: &MockServer) -> DwollaRailGateway {
        let aggregation = AggregationConfig {
            base_url: Some(server.uri()),
            ..AggregationConfig::default()
        };
        let plaid = Arc::new(PlaidClient::new(Client::new(), &aggregation));
        let rail = RailConfig {
            base_url: server.uri(),
            key: "rk".to_string(),
            secret: "rs".to_string(),
        };
        DwollaRailGateway::new(plaid, Client::new(), &rail)
    }

    fn processor_token() -> ProcessorToken {
        ProcessorToken("processor-sandbox-1".to_string())
    }

    async fn grant_application_token(server: &MockServer) {
        // "rk:rs" in base64
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("authorization", "Basic cms6cnM="))
            .and(body_string("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "app-token",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_register_funding_source_returns_location() {
        let server = MockServer::start().await;
        grant_application_token(&server).await;
        Mock::given(method("POST"))
            .and(path(FUNDING_SOURCE_PATH))
            .and(header("authorization", "Bearer app-token"))
            .and(header("accept", HAL_JSON))
            .and(body_partial_json(json!({
                "plaidToken": "processor-sandbox-1",
                "name": "Plaid Checking"
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", "https://api-sandbox.dwolla.com/funding-sources/fs-1"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = gateway(&server)
            .register_funding_source("cust-1", &processor_token(), "Plaid Checking")
            .await
            .unwrap();
        assert_eq!(url, "https://api-sandbox.dwolla.com/funding-sources/fs-1");
    }

    #[tokio::test]
    async fn test_created_without_location_is_empty_url() {
        let server = MockServer::start().await;
        grant_application_token(&server).await;
        Mock::given(method("POST"))
            .and(path(FUNDING_SOURCE_PATH))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .register_funding_source("cust-1", &processor_token(), "Plaid Checking")
            .await;
        assert!(matches!(result, Err(RailError::EmptyFundingSourceUrl)));
    }

    #[tokio::test]
    async fn test_rejected_funding_source() {
        let server = MockServer::start().await;
        grant_application_token(&server).await;
        Mock::given(method("POST"))
            .and(path(FUNDING_SOURCE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "DuplicateResource",
                "message": "Bank already exists"
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .register_funding_source("cust-1", &processor_token(), "Plaid Checking")
            .await;
        assert!(matches!(result, Err(RailError::FundingSource(message)) if message == "Bank already exists"));
    }

    #[tokio::test]
    async fn test_rejected_application_token_skips_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_client" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(FUNDING_SOURCE_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let result = gateway(&server)
            .register_funding_source("cust-1", &processor_token(), "Plaid Checking")
            .await;
        assert!(matches!(result, Err(RailError::FundingSource(_))));
    }

    #[tokio::test]
    async fn test_processor_token_is_minted_for_dwolla() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processor/token/create"))
            .and(body_partial_json(json!({
                "access_token": "access-abc",
                "account_id": "acc-1",
                "processor": "dwolla"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "processor_token": "processor-sandbox-1"
            })))
            .mount(&server)
            .await;

        let token = gateway(&server)
            .create_processor_token("access-abc", "acc-1")
            .await
            .unwrap();
        assert_eq!(token, processor_token());
    }

    #[tokio::test]
    async fn test_processor_token_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/processor/token/create"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "INVALID_ACCOUNT_ID",
                "error_message": "account not found"
            })))
            .mount(&server)
            .await;

        let result = gateway(&server).create_processor_token("access-abc", "acc-x").await;
        assert!(matches!(result, Err(RailError::ProcessorToken(_))));
    }
}
