//! 用户注册、登录与访问令牌校验
//!
//! 密码以 Argon2id PHC 字符串保存；访问令牌是随机生成的不透明值，
//! 数据库中只保存其 SHA-256 摘要。

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    models::{TokenResponse, User},
    repositories::{DUPLICATE_USER_MESSAGE, UserRepository},
};

/// 登录失败提示，不区分用户不存在与密码错误
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect username or password";

/// 令牌无效提示
pub const INVALID_TOKEN_MESSAGE: &str = "Could not validate credentials";

/// 生成 Argon2id 密码哈希
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("生成盐值失败: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("密码哈希失败: {}", e)))?;

    Ok(hash.to_string())
}

/// 校验密码，哈希格式无法解析时视为不匹配
pub fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("无法解析密码哈希: {}", e);
            false
        }
    }
}

/// 生成 256 位随机令牌（十六进制）
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// 令牌摘要，用于存储和查询
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 认证服务
#[derive(Debug, Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, token_ttl: Duration) -> Self {
        Self { users, token_ttl }
    }

    /// 注册新用户
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AppResult<User> {
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(AppError::bad_request(
                "username, email and password are required",
            ));
        }

        if self.users.exists_username_or_email(username, email).await? {
            return Err(AppError::bad_request(DUPLICATE_USER_MESSAGE));
        }

        let password = password.to_string();
        let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let user = self.users.create_user(username, email, &hashed).await?;
        info!(user_id = %user.id, username = %user.username, "用户注册成功");
        Ok(user)
    }

    /// 校验用户名密码并签发令牌
    pub async fn login(&self, username: &str, password: &str) -> AppResult<TokenResponse> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::bad_request(INVALID_CREDENTIALS_MESSAGE))?;

        let password = password.to_string();
        let hashed = user.hashed_password.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hashed))
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        if !valid {
            return Err(AppError::bad_request(INVALID_CREDENTIALS_MESSAGE));
        }

        let now = Utc::now();
        let purged = self.users.delete_expired_tokens(now).await?;
        if purged > 0 {
            debug!(purged, "已清理过期令牌");
        }

        let token = generate_token();
        self.users
            .insert_token(&hash_token(&token), user.id, now + self.token_ttl)
            .await?;

        info!(user_id = %user.id, "用户登录成功");
        Ok(TokenResponse::bearer(token))
    }

    /// 解析令牌对应的用户
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        if token.is_empty() {
            return Err(AppError::unauthorized(INVALID_TOKEN_MESSAGE));
        }

        self.users
            .find_user_by_token(&hash_token(token), Utc::now())
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_TOKEN_MESSAGE))
    }
}
