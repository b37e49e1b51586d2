//! Bank account repository
//!
//! `BankAccountStore` over the local `bank_accounts` table.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::gateways::{BankAccountStore, StorageError};
use crate::models::{BankAccountRecord, NewBankAccount};

/// SQLx-based bank account store
pub struct SqlxBankAccountStore {
    pool: SqlitePool,
}

impl SqlxBankAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed store for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn BankAccountStore> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BankAccountStore for SqlxBankAccountStore {
    async fn create_bank_account(&self, new: NewBankAccount) -> Result<BankAccountRecord, StorageError> {
        let record = BankAccountRecord::from_new(Uuid::new_v4().simple().to_string(), new, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO bank_accounts
                (id, user_id, bank_id, account_id, access_token, funding_source_url, shareable_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.bank_id)
        .bind(&record.account_id)
        .bind(&record.access_token)
        .bind(&record.funding_source_url)
        .bind(&record.shareable_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_bank_accounts(&self, user_id: &str) -> Result<Vec<BankAccountRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, bank_id, account_id, access_token, funding_source_url, shareable_id, created_at
            FROM bank_accounts
            WHERE user_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_account_id(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BankAccountRecord>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, bank_id, account_id, access_token, funding_source_url, shareable_id, created_at
            FROM bank_accounts
            WHERE user_id = ? AND account_id = ?
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<BankAccountRecord, StorageError> {
    Ok(BankAccountRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bank_id: row.try_get("bank_id")?,
        account_id: row.try_get("account_id")?,
        access_token: row.try_get("access_token")?,
        funding_source_url: row.try_get("funding_source_url")?,
        shareable_id: row.try_get("shareable_id")?,
        created_at: row.try_get("created_at")?,
    })
}
