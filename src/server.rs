/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{WhitelistError, WhitelistResult},
};
use axum::{
    http::{header, Method, StatusCode},
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(crate::api::routes())
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server and run until SIGINT/SIGTERM
pub async fn serve(ctx: AppContext) -> WhitelistResult<()> {
    let addr = format!("{}:{}", ctx.config.service.host, ctx.config.service.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WhitelistError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("whitelist bridge listening on {}", addr);

    ctx.warm_up().await;

    let app = build_router(ctx.clone());
    let shutdown_ctx = ctx.clone();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutting down, draining requests");
            // Drop out of load balancers before connections close
            shutdown_ctx.health.mark_not_ready();
        })
        .await
        .map_err(|e| WhitelistError::Internal(format!("Server error: {}", e)))?;

    ctx.close().await;
    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::whitelist::{AllowedResponse, RegisterResponse},
        config::ServerConfig,
        db,
        error::{ErrorResponse, WhitelistResult},
        health::HealthReport,
        store::{LinkRecord, LinkStore, LinkUpsert, SqliteLinkStore},
        vrchat::{VrchatDirectory, VrchatUser},
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticDirectory;

    #[async_trait]
    impl VrchatDirectory for StaticDirectory {
        async fn search_exact_by_display_name(&self, display_name: &str) -> WhitelistResult<VrchatUser> {
            match display_name {
                "Foo" => Ok(VrchatUser {
                    id: "usr_foo".to_string(),
                    display_name: "Foo".to_string(),
                    avatar_url: None,
                }),
                "Twin" => Err(WhitelistError::MultipleExactMatch),
                "Locked" => Err(WhitelistError::Auth("totp rejected".to_string())),
                _ => Err(WhitelistError::NoExactMatch),
            }
        }
    }

    /// Fails Discord-id lookups once `healthy_reads` of them have been served
    struct FlakyReads {
        inner: SqliteLinkStore,
        healthy_reads: usize,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl LinkStore for FlakyReads {
        async fn get_by_discord_id(&self, id: &str) -> WhitelistResult<Option<LinkRecord>> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= self.healthy_reads {
                return Err(WhitelistError::Store(sqlx::Error::PoolTimedOut));
            }
            self.inner.get_by_discord_id(id).await
        }

        async fn get_by_vrc_user_id(&self, id: &str) -> WhitelistResult<Option<LinkRecord>> {
            self.inner.get_by_vrc_user_id(id).await
        }

        async fn exists_by_discord_id(&self, id: &str) -> WhitelistResult<bool> {
            self.inner.exists_by_discord_id(id).await
        }

        async fn exists_by_vrc_user_id(&self, id: &str) -> WhitelistResult<bool> {
            self.inner.exists_by_vrc_user_id(id).await
        }

        async fn upsert(&self, link: &LinkUpsert) -> WhitelistResult<()> {
            self.inner.upsert(link).await
        }

        async fn delete_by_discord_id(&self, id: &str) -> WhitelistResult<bool> {
            self.inner.delete_by_discord_id(id).await
        }

        async fn ping(&self) -> WhitelistResult<()> {
            self.inner.ping().await
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig::from_lookup(|key| {
            let value = match key {
                "VRCHAT_USERNAME" => Some("bot"),
                "VRCHAT_PASSWORD" => Some("hunter2"),
                "VRCHAT_TOTP_SECRET" => Some("JBSWY3DPEHPK3PXP"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap()
    }

    async fn test_context() -> AppContext {
        let config = test_config();
        let store = SqliteLinkStore::new(db::create_memory_pool().await.unwrap());
        AppContext::from_parts(config, Arc::new(store), Arc::new(StaticDirectory))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn register_body(discord: &str, name: &str) -> String {
        json!({ "discord_user_id": discord, "vrc_display_name": name }).to_string()
    }

    #[tokio::test]
    async fn test_register_lifecycle() {
        let app = build_router(test_context().await);

        let (status, body) = send(&app, "POST", "/discord/whitelist/register", Some(&register_body("111", "Foo"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let response: RegisterResponse = serde_json::from_slice(&body).unwrap();
        assert!(response.created);
        assert_eq!(response.link.unwrap().vrc_user_id, "usr_foo");

        let (status, _) = send(&app, "POST", "/discord/whitelist/register", Some(&register_body("111", "Foo"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/discord/whitelist/111/allowed", None).await;
        assert_eq!(status, StatusCode::OK);
        let allowed: AllowedResponse = serde_json::from_slice(&body).unwrap();
        assert!(allowed.allowed);

        let (_, body) = send(&app, "GET", "/vrchat/whitelist/usr_foo/allowed", None).await;
        let allowed: AllowedResponse = serde_json::from_slice(&body).unwrap();
        assert!(allowed.allowed);

        let (status, _) = send(&app, "GET", "/discord/whitelist/111", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "POST", "/discord/whitelist/remove", Some(r#"{"discord_user_id":"111"}"#)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", "/discord/whitelist/111", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "GET", "/discord/whitelist/111/allowed", None).await;
        let allowed: AllowedResponse = serde_json::from_slice(&body).unwrap();
        assert!(!allowed.allowed);
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let app = build_router(test_context().await);
        send(&app, "POST", "/discord/whitelist/register", Some(&register_body("111", "Foo"))).await;

        let cases = [
            (register_body("222", "Foo"), StatusCode::CONFLICT, "AlreadyLinkedElsewhere"),
            (register_body("222", "Ghost"), StatusCode::BAD_REQUEST, "NoExactMatch"),
            (register_body("222", "Twin"), StatusCode::BAD_REQUEST, "MultipleExactMatch"),
            (register_body("", "Foo"), StatusCode::BAD_REQUEST, "InvalidArgument"),
            (register_body("222", "Locked"), StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
            ("{not json".to_string(), StatusCode::BAD_REQUEST, "InvalidArgument"),
        ];

        for (body, expected_status, expected_code) in cases {
            let (status, bytes) = send(&app, "POST", "/discord/whitelist/register", Some(&body)).await;
            assert_eq!(status, expected_status, "body: {}", body);
            let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(error.error, expected_code);
        }
    }

    #[tokio::test]
    async fn test_remove_unlinked_is_no_content() {
        let app = build_router(test_context().await);

        let (status, _) = send(&app, "POST", "/discord/whitelist/remove", Some(r#"{"discord_user_id":"999"}"#)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "POST", "/discord/whitelist/remove", Some(r#"{}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoints_follow_ready_flag() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());

        let (status, _) = send(&app, "GET", "/api/livez", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", "/api/readyz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        ctx.warm_up().await;
        let (status, _) = send(&app, "GET", "/api/readyz", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/api/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert!(report.live && report.ready && report.db);

        ctx.health.mark_not_ready();
        let (status, body) = send(&app, "GET", "/api/healthz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert!(report.db && !report.ready);
    }

    #[tokio::test]
    async fn test_panel_interactions() {
        let app = build_router(test_context().await);

        let (status, body) = send(
            &app,
            "POST",
            "/discord/panel",
            Some(r#"{"type":"button","discord_user_id":"111","custom_id":"wl_register"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&body).unwrap(), json!("Modal"));

        let (status, body) = send(
            &app,
            "POST",
            "/discord/panel",
            Some(
                r#"{"type":"modal","discord_user_id":"111","custom_id":"wl_modal_register",
                    "inputs":{"wl_modal_input_vrc_name":"Foo"}}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["Panel"]["view"]["linked"], json!(true));

        let (status, _) = send(
            &app,
            "POST",
            "/discord/panel",
            Some(r#"{"type":"button","discord_user_id":"111","custom_id":"nope"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = build_router(test_context().await);
        let (status, _) = send(&app, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_survives_failed_read_back() {
        // register_link reads once to decide created/updated; the handler's
        // read-back is the second lookup
        let store = FlakyReads {
            inner: SqliteLinkStore::new(db::create_memory_pool().await.unwrap()),
            healthy_reads: 1,
            reads: AtomicUsize::new(0),
        };
        let ctx = AppContext::from_parts(test_config(), Arc::new(store), Arc::new(StaticDirectory));
        let app = build_router(ctx.clone());

        let (status, body) = send(&app, "POST", "/discord/whitelist/register", Some(&register_body("111", "Foo"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let response: RegisterResponse = serde_json::from_slice(&body).unwrap();
        assert!(response.created);
        assert!(response.link.is_none());

        assert!(ctx.whitelist.is_allowed("111").await.unwrap());
    }
}
