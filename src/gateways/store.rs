//! Persistence gateway
//!
//! Bank-account records live in a document store. The default driver talks
//! to an Appwrite database collection; a local SQLite driver lives in
//! `db::repositories`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::appwrite::{equal_query, error_body, AppwriteClient, UNIQUE_ID};
use crate::models::{BankAccountRecord, NewBankAccount};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The document store rejected the request
    #[error("Document store error {status}: {message}")]
    Api { status: u16, message: String },

    /// Request never produced a usable response
    #[error("Document store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Bank-account record store
#[async_trait]
pub trait BankAccountStore: Send + Sync {
    /// Insert one record. The store generates the id.
    async fn create_bank_account(&self, new: NewBankAccount) -> Result<BankAccountRecord, StorageError>;

    /// All records owned by `user_id`, oldest first
    async fn list_bank_accounts(&self, user_id: &str) -> Result<Vec<BankAccountRecord>, StorageError>;

    /// The record for `account_id`, if owned by `user_id`
    async fn find_by_account_id(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BankAccountRecord>, StorageError>;
}

/// Appwrite database collection store
#[derive(Debug)]
pub struct AppwriteBankAccountStore {
    client: AppwriteClient,
    database_id: String,
    collection_id: String,
}

impl AppwriteBankAccountStore {
    pub fn new(client: AppwriteClient, database_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            client,
            database_id: database_id.into(),
            collection_id: collection_id.into(),
        }
    }

    pub fn boxed(
        client: AppwriteClient,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Arc<dyn BankAccountStore> {
        Arc::new(Self::new(client, database_id, collection_id))
    }

    fn documents_path(&self) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, self.collection_id
        )
    }

    async fn query(&self, queries: Vec<String>) -> Result<Vec<BankAccountRecord>, StorageError> {
        let params: Vec<(&str, String)> = queries.into_iter().map(|q| ("queries[]", q)).collect();
        let response = self
            .client
            .admin(Method::GET, &self.documents_path())
            .query(&params)
            .send()
            .await
            .inspect_err(|err| tracing::error!("Document store query failed: {}", err))?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            tracing::error!("Document store query rejected ({}): {}", status, body.kind);
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: body.message,
            });
        }

        let list: DocumentList = response.json().await?;
        Ok(list.documents.into_iter().map(Into::into).collect())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BankAccountData<'a> {
    user_id: &'a str,
    bank_id: &'a str,
    account_id: &'a str,
    access_token: &'a str,
    funding_source_url: &'a str,
    shareable_id: &'a str,
}

impl<'a> From<&'a NewBankAccount> for BankAccountData<'a> {
    fn from(new: &'a NewBankAccount) -> Self {
        Self {
            user_id: &new.user_id,
            bank_id: &new.bank_id,
            account_id: &new.account_id,
            access_token: &new.access_token,
            funding_source_url: &new.funding_source_url,
            shareable_id: &new.shareable_id,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocumentRequest<'a> {
    document_id: &'a str,
    data: BankAccountData<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankAccountDocument {
    #[serde(rename = "$id")]
    id: String,
    #[serde(rename = "$createdAt")]
    created_at: DateTime<Utc>,
    user_id: String,
    bank_id: String,
    account_id: String,
    access_token: String,
    funding_source_url: String,
    shareable_id: String,
}

impl From<BankAccountDocument> for BankAccountRecord {
    fn from(doc: BankAccountDocument) -> Self {
        BankAccountRecord {
            id: doc.id,
            user_id: doc.user_id,
            bank_id: doc.bank_id,
            account_id: doc.account_id,
            access_token: doc.access_token,
            funding_source_url: doc.funding_source_url,
            shareable_id: doc.shareable_id,
            created_at: doc.created_at,
        }
    }
}

#[derive(Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<BankAccountDocument>,
}

#[async_trait]
impl BankAccountStore for AppwriteBankAccountStore {
    async fn create_bank_account(&self, new: NewBankAccount) -> Result<BankAccountRecord, StorageError> {
        let response = self
            .client
            .admin(Method::POST, &self.documents_path())
            .json(&CreateDocumentRequest {
                document_id: UNIQUE_ID,
                data: BankAccountData::from(&new),
            })
            .send()
            .await
            .inspect_err(|err| tracing::error!("Document store insert failed: {}", err))?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            tracing::error!("Document store insert rejected ({}): {}", status, body.kind);
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: body.message,
            });
        }

        let doc: BankAccountDocument = response.json().await?;
        Ok(doc.into())
    }

    async fn list_bank_accounts(&self, user_id: &str) -> Result<Vec<BankAccountRecord>, StorageError> {
        self.query(vec![equal_query("userId", user_id)]).await
    }

    async fn find_by_account_id(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BankAccountRecord>, StorageError> {
        let records = self
            .query(vec![
                equal_query("userId", user_id),
                equal_query("accountId", account_id),
            ])
            .await?;
        Ok(records.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_account() -> NewBankAccount {
        NewBankAccount {
            user_id: "u1".to_string(),
            bank_id: "item-1".to_string(),
            account_id: "acc-1".to_string(),
            access_token: "access-sandbox-1".to_string(),
            funding_source_url: "https://rail/funding-sources/1".to_string(),
            shareable_id: "YWNjLTE".to_string(),
        }
    }

    #[test]
    fn test_create_request_uses_document_field_names() {
        let new = new_account();
        let body = serde_json::to_value(CreateDocumentRequest {
            document_id: UNIQUE_ID,
            data: BankAccountData::from(&new),
        })
        .unwrap();

        assert_eq!(body["documentId"], "unique()");
        assert_eq!(body["data"]["userId"], "u1");
        assert_eq!(body["data"]["bankId"], "item-1");
        assert_eq!(body["data"]["accountId"], "acc-1");
        assert_eq!(body["data"]["accessToken"], "access-sandbox-1");
        assert_eq!(body["data"]["fundingSourceUrl"], "https://rail/funding-sources/1");
        assert_eq!(body["data"]["shareableId"], "YWNjLTE");
    }

    #[test]
    fn test_document_parses_into_record() {
        let doc: BankAccountDocument = serde_json::from_value(json!({
            "$id": "doc-1",
            "$createdAt": "2024-05-01T10:00:00.000+00:00",
            "$collectionId": "banks",
            "userId": "u1",
            "bankId": "item-1",
            "accountId": "acc-1",
            "accessToken": "access-sandbox-1",
            "fundingSourceUrl": "https://rail/funding-sources/1",
            "shareableId": "YWNjLTE"
        }))
        .unwrap();

        let record: BankAccountRecord = doc.into();
        assert_eq!(record.id, "doc-1");
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

}
