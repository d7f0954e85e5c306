//! PostgreSQL 账户仓储实现

use async_trait::async_trait;
use crm_auth_core::Role;
use crm_common::{AccountId, AuditInfo};
use crm_errors::{AppError, AppResult};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::domain::entities::Account;
use crate::domain::repositories::AccountRepository;
use crate::domain::value_objects::PhoneNumber;

const ACCOUNT_COLUMNS: &str = "id, phone, display_name, role, is_active, created_at, updated_at";

/// 数据库行模型
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: uuid::Uuid,
    phone: String,
    display_name: Option<String>,
    role: String,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl AccountRow {
    fn into_account(self) -> AppResult<Account> {
        let phone = PhoneNumber::parse(&self.phone).map_err(|e| {
            AppError::database(format!("Stored phone for account {} is invalid: {}", self.id, e))
        })?;
        let role: Role = self.role.parse().map_err(|e| {
            AppError::database(format!("Stored role for account {} is invalid: {}", self.id, e))
        })?;

        Ok(Account {
            id: AccountId::from_uuid(self.id),
            phone,
            display_name: self.display_name,
            role,
            is_active: self.is_active,
            audit_info: AuditInfo {
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}

/// PostgreSQL 账户仓储
pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn find_by_phone(&self, phone: &PhoneNumber) -> AppResult<Option<Account>> {
        debug!(phone = %phone.masked(), "Finding account by phone");

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE phone = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to find account by phone");
            AppError::database(format!("Failed to find account: {}", e))
        })?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn find_by_id(&self, id: &AccountId) -> AppResult<Option<Account>> {
        debug!(account_id = %id, "Finding account by ID");

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to find account by ID");
            AppError::database(format!("Failed to find account: {}", e))
        })?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn create(&self, phone: &PhoneNumber) -> AppResult<Account> {
        let account = Account::register(phone.clone());

        // 冲突时返回已有行，并发注册只会留下一条记录
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (id, phone, display_name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id.0)
        .bind(account.phone.as_str())
        .bind(&account.display_name)
        .bind(account.role.as_str())
        .bind(account.is_active)
        .bind(account.audit_info.created_at)
        .bind(account.audit_info.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create account");
            AppError::database(format!("Failed to create account: {}", e))
        })?;

        let stored = row.into_account()?;
        debug!(account_id = %stored.id, created = stored.id == account.id, "Account persisted");
        Ok(stored)
    }

    async fn set_active(&self, id: &AccountId, active: bool) -> AppResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE accounts
            SET is_active = $2,
                updated_at = CASE WHEN is_active = $2 THEN updated_at ELSE NOW() END
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id.0)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to update account status");
            AppError::database(format!("Failed to update account: {}", e))
        })?;

        row.map(AccountRow::into_account).transpose()
    }
}
