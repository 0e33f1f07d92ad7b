//! 持久化层：扫描记录与用户/令牌
//!
//! Postgres 实现用于正常部署；数据库不可用时与测试中使用内存实现。

pub mod memory;
pub mod scan;
pub mod user;

pub use memory::{MemoryScanRepository, MemoryUserRepository};
pub use scan::PgScanRepository;
pub use user::PgUserRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{NewScan, ScanRecord, ScanStatus, User},
};

/// 用户名或邮箱重复时的提示
pub const DUPLICATE_USER_MESSAGE: &str = "Username or email already registered";

/// 扫描记录存储
#[async_trait]
pub trait ScanRepository: Send + Sync + std::fmt::Debug {
    /// 插入状态为 running 的新记录
    async fn insert(&self, scan: &NewScan) -> AppResult<ScanRecord>;

    /// 仅当记录仍为 running 时写入终态和结果，返回是否更新
    async fn finish_running(
        &self,
        scan_id: Uuid,
        status: ScanStatus,
        results: &JsonValue,
    ) -> AppResult<bool>;

    /// 按ID和所属用户查询
    async fn find_for_owner(&self, scan_id: Uuid, user_id: Uuid) -> AppResult<Option<ScanRecord>>;

    /// 列出用户的全部扫描，按创建顺序
    async fn list_for_owner(&self, user_id: Uuid) -> AppResult<Vec<ScanRecord>>;

    /// 将所有 running 记录标记为失败，返回影响行数
    async fn fail_all_running(&self, results: &JsonValue) -> AppResult<u64>;
}

/// 用户与访问令牌存储
#[async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug {
    /// 创建用户，用户名或邮箱重复时返回 BadRequest
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> AppResult<User>;

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    async fn exists_username_or_email(&self, username: &str, email: &str) -> AppResult<bool>;

    /// 保存令牌摘要
    async fn insert_token(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// 查询未过期令牌对应的用户
    async fn find_user_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<User>>;

    /// 清理过期令牌，返回删除数量
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
