use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DUPLICATE_USER_MESSAGE, ScanRepository, UserRepository};
use crate::{
    error::{AppError, AppResult},
    models::{NewScan, ScanRecord, ScanStatus, User},
};

/// 内存扫描记录仓库，按插入顺序保存
#[derive(Debug, Default)]
pub struct MemoryScanRepository {
    records: RwLock<Vec<ScanRecord>>,
}

impl MemoryScanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanRepository for MemoryScanRepository {
    async fn insert(&self, scan: &NewScan) -> AppResult<ScanRecord> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.scan_id == scan.scan_id) {
            return Err(AppError::validation(format!(
                "扫描ID已存在: {}",
                scan.scan_id
            )));
        }

        let record = ScanRecord::running(scan, Utc::now());
        records.push(record.clone());
        Ok(record)
    }

    async fn finish_running(
        &self,
        scan_id: Uuid,
        status: ScanStatus,
        results: &JsonValue,
    ) -> AppResult<bool> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|r| r.scan_id == scan_id && r.status == ScanStatus::Running)
        {
            Some(record) => {
                record.status = status;
                record.results = Some(results.clone());
                record.finished_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_for_owner(&self, scan_id: Uuid, user_id: Uuid) -> AppResult<Option<ScanRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.scan_id == scan_id && r.user_id == user_id)
            .cloned())
    }

    async fn list_for_owner(&self, user_id: Uuid) -> AppResult<Vec<ScanRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn fail_all_running(&self, results: &JsonValue) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let mut count = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.status == ScanStatus::Running)
        {
            record.status = ScanStatus::Failed;
            record.results = Some(results.clone());
            record.finished_at = Some(now);
            count += 1;
        }
        Ok(count)
    }
}

#[derive(Debug, Default)]
struct UserTables {
    users: Vec<User>,
    /// 令牌摘要 -> (用户ID, 过期时间)
    tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
}

/// 内存用户仓库
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    tables: RwLock<UserTables>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.username == username || u.email == email)
        {
            return Err(AppError::bad_request(DUPLICATE_USER_MESSAGE));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn exists_username_or_email(&self, username: &str, email: &str) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .any(|u| u.username == username || u.email == email))
    }

    async fn insert_token(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .tokens
            .insert(token_hash.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn find_user_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        let user = tables
            .tokens
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(user_id, _)| tables.users.iter().find(|u| u.id == *user_id))
            .cloned();
        Ok(user)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - tables.tokens.len()) as u64)
    }
}
