/*
 * Garak Scan Backend - LLM Vulnerability Scan Service
 * Copyright (c) 2024 SampleFarm Project
 *
 * This work is licensed under CC BY-NC-SA 4.0
 * https://creativecommons.org/licenses/by-nc-sa/4.0/
 */

use axum::response::Html;
use axum::{
    Router,
    extract::{Query, State},
    http::Method,
    response::Json,
    routing::get,
};
use garak_scan_backend::{
    config::Config,
    database::Database,
    docs::ApiDoc,
    error::AppResult,
    handlers::AppState,
    response::{ApiResponse, ResponseCode},
    routes::create_api_routes,
};
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

/// 关闭时等待扫描写入失败状态的时长
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct HealthQuery {
    #[serde(default)]
    detail: bool,
}

/// 健康检查处理器
async fn health_check(
    State(app_state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> Json<ApiResponse<serde_json::Value>> {
    if params.detail {
        Json(ApiResponse::success(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "persistence": if app_state.database.is_some() { "postgres" } else { "memory" },
            "scans_in_flight": app_state.scans.in_flight_count().await,
        })))
    } else {
        Json(ApiResponse::success(serde_json::json!({"status": "ok"})))
    }
}

/// 系统信息处理器
async fn system_info(
    State(app_state): State<AppState>,
) -> Json<ApiResponse<HashMap<&'static str, serde_json::Value>>> {
    let garak = &app_state.config.garak;
    let mut info = HashMap::new();
    info.insert("name", serde_json::json!("Garak Scan Backend"));
    info.insert("version", serde_json::json!(env!("CARGO_PKG_VERSION")));
    info.insert("garak_executable", serde_json::json!(garak.executable));
    info.insert("report_directory", serde_json::json!(garak.report_directory));
    info.insert(
        "max_concurrent_scans",
        serde_json::json!(garak.max_concurrent_scans),
    );
    info.insert(
        "available_scan_slots",
        serde_json::json!(app_state.scans.available_permits()),
    );

    Json(ApiResponse::success(info))
}

/// 数据库健康检查处理器
async fn db_health_check(
    State(app_state): State<AppState>,
) -> Json<ApiResponse<serde_json::Value>> {
    match &app_state.database {
        Some(db) => match db.health_check().await {
            Ok(true) => Json(ApiResponse::success(serde_json::json!({
                "database": "healthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))),
            Ok(false) => Json(ApiResponse::error_with_data(
                ResponseCode::SERVICE_UNAVAILABLE,
                "数据库连接异常".to_string(),
                serde_json::json!({"status": "unhealthy"}),
            )),
            Err(e) => {
                tracing::error!("数据库健康检查失败: {}", e);
                Json(ApiResponse::error_with_data(
                    ResponseCode::SERVICE_UNAVAILABLE,
                    format!("数据库健康检查失败: {}", e),
                    serde_json::json!({"status": "error"}),
                ))
            }
        },
        None => Json(ApiResponse::error_with_data(
            ResponseCode::SERVICE_UNAVAILABLE,
            "数据库未配置或连接失败，当前使用内存存储".to_string(),
            serde_json::json!({"status": "unavailable"}),
        )),
    }
}

/// Swagger UI 页面（访问路径：/swagger-ui 或 /swagger-ui/）
/// OpenAPI JSON 路径：/api-docs/openapi.json
async fn swagger_ui_page() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset=UTF-8>
  <title>Garak Scan Backend API 文档</title>
  <link rel=stylesheet href=https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.11.0/swagger-ui.css>
  <style>
    body { margin: 0; font-family: Arial, sans-serif; }
    #swagger-ui { max-width: 100%; }
  </style>
</head>
<body>
  <div id=swagger-ui>
    <div style="padding: 50px; text-align: center;">正在加载 API 文档...</div>
  </div>
  <script src=https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.11.0/swagger-ui-bundle.js></script>
  <script src=https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.11.0/swagger-ui-standalone-preset.js></script>
  <script>
    window.onload = function() {
      try {
        window.ui = SwaggerUIBundle({
          url: '/api-docs/openapi.json',
          dom_id: '#swagger-ui',
          deepLinking: true,
          presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
          layout: 'StandaloneLayout',
          validatorUrl: null
        });
      } catch (error) {
        console.error('SwaggerUI error:', error);
        document.getElementById('swagger-ui').innerHTML = '<h2>Failed to load API docs</h2><a href="/api-docs/openapi.json">View raw OpenAPI JSON</a>';
      }
    };
  </script>
</body>
</html>"#,
    )
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听 Ctrl+C 失败: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("收到停止信号，开始优雅关闭");
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "garak_scan_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置（文件不存在时写出默认配置）
    let mut config = Config::load_or_init("config.toml")?;
    config.apply_env_overrides();
    config.validate()?;

    tracing::info!("服务器配置: {}", config.server_addr());
    tracing::info!(
        executable = %config.garak.executable,
        report_directory = %config.garak.report_directory,
        max_concurrent_scans = config.garak.max_concurrent_scans,
        timeout_secs = config.garak.timeout_secs,
        "garak配置"
    );

    // 初始化数据库（如果连接失败则继续启动，但记录警告）
    let database = match Database::new(&config.database).await {
        Ok(db) => {
            // 验证数据库连接和版本
            if let Err(e) = db.verify_connection().await {
                tracing::warn!("数据库验证失败: {}", e);
            }
            match db.migrate().await {
                Ok(()) => Some(db),
                Err(e) => {
                    tracing::warn!("数据库建表失败，服务将使用内存存储: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!("数据库连接失败，服务将在无数据库模式下启动: {}", e);
            None
        }
    };

    // 创建应用状态
    let app_state = AppState::new(config.clone(), database);

    // 启动恢复：上次进程遗留的 running 扫描不会再有结果
    if config.garak.recover_interrupted_scans {
        if let Err(e) = app_state.scans.tracker().recover_interrupted().await {
            tracing::warn!("恢复遗留扫描失败: {}", e);
        }
    } else {
        tracing::info!("启动恢复已禁用");
    }

    // 创建CORS中间件
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        // 健康检查和系统信息
        .route("/health", get(health_check))
        .route("/api/system/info", get(system_info))
        .route("/api/health/db", get(db_health_check))
        // OpenAPI JSON 路由
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        // Swagger UI 页面
        .route("/swagger-ui", get(swagger_ui_page))
        .route("/swagger-ui/", get(swagger_ui_page))
        // 业务API路由
        .merge(create_api_routes())
        .with_state(app_state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("🚀 服务器启动成功，监听地址: {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止执行中的扫描并记录为失败
    app_state.scans.shutdown(SHUTDOWN_GRACE).await;
    if let Some(db) = &app_state.database {
        db.close().await;
    }
    tracing::info!("服务已停止");

    Ok(())
}
