//! Shared Appwrite REST plumbing
//!
//! The identity gateway and the document store both talk to the same Appwrite
//! project. Server-side calls authenticate with the project API key; calls made
//! on behalf of a signed-in user carry the session secret instead.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::IdentityConfig;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Id placeholder asking Appwrite to generate a unique id
pub const UNIQUE_ID: &str = "unique()";

/// Thin request builder bound to one Appwrite project
#[derive(Clone)]
pub struct AppwriteClient {
    http: Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl AppwriteClient {
    pub fn new(http: Client, config: &IdentityConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Request authenticated with the project API key
    pub fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.project_id)
            .header(KEY_HEADER, &self.api_key)
    }

    /// Request made on behalf of the session identified by `secret`
    pub fn session(&self, method: Method, path: &str, secret: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.project_id)
            .header(SESSION_HEADER, secret)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

impl std::fmt::Debug for AppwriteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppwriteClient")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Error body returned by every Appwrite endpoint
#[derive(Debug, Default, Deserialize)]
pub struct AppwriteErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Read the error body of a failed response, tolerating non-JSON bodies
pub async fn error_body(response: Response) -> (StatusCode, AppwriteErrorBody) {
    let status = response.status();
    let body = response.json::<AppwriteErrorBody>().await.unwrap_or_default();
    (status, body)
}

/// `equal` query in Appwrite's JSON query syntax
pub fn equal_query(attribute: &str, value: &str) -> String {
    json!({ "method": "equal", "attribute": attribute, "values": [value] }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_query_syntax() {
        let query: serde_json::Value = serde_json::from_str(&equal_query("userId", "u1")).unwrap();
        assert_eq!(query["method"], "equal");
        assert_eq!(query["attribute"], "userId");
        assert_eq!(query["values"], json!(["u1"]));
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let config = IdentityConfig {
            endpoint: "https://identity.example.com/v1/".to_string(),
            ..IdentityConfig::default()
        };
        let client = AppwriteClient::new(Client::new(), &config);
        assert_eq!(client.url("/account"), "https://identity.example.com/v1/account");
    }
}
