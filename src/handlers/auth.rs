use axum::{
    Form, Json,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{
    error::AppError,
    handlers::AppState,
    models::{MessageResponse, RegisterRequest, TokenRequest, TokenResponse, User},
    response::ApiResponse,
};

/// 已认证的当前用户
///
/// 从 `Authorization: Bearer <token>` 解析；缺失或无效时返回 401。
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Not authenticated"))?;

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            _ => return Err(AppError::unauthorized("Not authenticated")),
        };

        let user = state.auth.authenticate(token).await?;
        Ok(CurrentUser(user))
    }
}

/// 注册用户
#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "注册成功", body = MessageResponse),
        (status = 400, description = "用户名或邮箱已存在")
    )
)]
pub async fn register(
    State(app_state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    app_state
        .auth
        .register(&request.username, &request.email, &request.password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User created successfully",
    ))))
}

/// 用户名密码换取访问令牌（表单提交）
#[utoipa::path(
    post,
    path = "/token",
    tag = "auth",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "登录成功", body = TokenResponse),
        (status = 400, description = "用户名或密码错误")
    )
)]
pub async fn token(
    State(app_state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, AppError> {
    let token = app_state
        .auth
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(ApiResponse::success(token)))
}
