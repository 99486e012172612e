//! Component wiring and the HTTP router.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::crypto::SecretCipher;
use crate::db::DbPool;
use crate::deploy::{
    CallbackNotifier, ContainerEngine, ContainerLifecycleManager, DeploymentOrchestrator,
    LifecycleOptions, RegistryAuthResolver,
};
use crate::error::AppResult;
use crate::handlers;
use crate::services::{EnvironmentResolver, EnvironmentService, RegistryService, SecretService};
use crate::state::AppState;
use crate::store::Stores;

/// Build the application router with all routes.
pub fn build_router(
    state: AppState,
    secret_service: SecretService,
    registry_service: RegistryService,
    environment_service: EnvironmentService,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health))
        .with_state(state.clone());

    let deploy_routes = Router::new()
        .route("/api/deploy", post(handlers::deploy::deploy))
        .route(
            "/api/applications",
            get(handlers::deploy::list_applications),
        )
        .route(
            "/api/applications/{name}/deployments",
            get(handlers::deploy::list_deployments),
        )
        .with_state(state);

    let secret_routes = Router::new()
        .route(
            "/api/secrets",
            post(handlers::secrets::create).get(handlers::secrets::list),
        )
        .route(
            "/api/secrets/{id}",
            get(handlers::secrets::get)
                .put(handlers::secrets::update)
                .delete(handlers::secrets::delete),
        )
        .with_state(secret_service);

    let registry_routes = Router::new()
        .route(
            "/api/registries",
            post(handlers::registries::create).get(handlers::registries::list),
        )
        .route(
            "/api/registries/{id}",
            get(handlers::registries::get)
                .put(handlers::registries::update)
                .delete(handlers::registries::delete),
        )
        .route(
            "/api/registries/{id}/default",
            post(handlers::registries::set_default),
        )
        .with_state(registry_service);

    let env_routes = Router::new()
        .route(
            "/api/env",
            post(handlers::env::upsert).get(handlers::env::list),
        )
        .route("/api/env/{id}", axum::routing::delete(handlers::env::delete))
        .route(
            "/api/env/preview/{application_id}",
            get(handlers::env::preview),
        )
        .with_state(environment_service);

    Router::new()
        .merge(health_routes)
        .merge(deploy_routes)
        .merge(secret_routes)
        .merge(registry_routes)
        .merge(env_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Wire services, the orchestrator and the router from their dependencies.
pub fn build_app(
    config: AppConfig,
    engine: Arc<dyn ContainerEngine>,
    stores: Stores,
    cipher: SecretCipher,
    db: Option<DbPool>,
) -> AppResult<Router> {
    let callback = match config.callback_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Some(CallbackNotifier::new(
            url,
            config.callback_secret.clone(),
            config.callback_timeout(),
        )?),
        _ => None,
    };
    if callback.is_none() {
        tracing::info!("No callback URL configured, deployment callbacks disabled");
    }

    let resolver = EnvironmentResolver::new(
        stores.env_entries.clone(),
        stores.secrets.clone(),
        cipher.clone(),
    );

    let orchestrator = DeploymentOrchestrator::new(
        stores.clone(),
        RegistryAuthResolver::new(stores.repositories.clone(), config.default_registry.clone()),
        ContainerLifecycleManager::new(engine.clone(), LifecycleOptions::from(&config)),
        resolver.clone(),
        callback,
    );

    let secret_service = SecretService::new(
        stores.secrets.clone(),
        stores.env_entries.clone(),
        cipher,
    );
    let registry_service = RegistryService::new(stores.repositories.clone());
    let environment_service =
        EnvironmentService::new(stores.env_entries.clone(), stores.secrets.clone(), resolver);

    let state = AppState::new(config, engine, stores, orchestrator, db);

    Ok(build_router(
        state,
        secret_service,
        registry_service,
        environment_service,
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{memory_stores, test_cipher, FakeEngine};

    fn app() -> (Router, Arc<FakeEngine>) {
        let engine = Arc::new(FakeEngine::new());
        let (_, stores) = memory_stores();
        let router = build_app(
            AppConfig::default(),
            engine.clone(),
            stores,
            test_cipher(),
            None,
        )
        .unwrap();
        (router, engine)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app();
        let (status, body) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["docker"], "ok");
        assert_eq!(body["store"], "memory");
        assert!(body.get("database").is_none());
    }

    #[tokio::test]
    async fn test_deploy_and_history() {
        let (router, engine) = app();
        let request = json!({
            "name": "web",
            "image": "nginx",
            "version": "1.27",
            "hostPort": 8080,
            "containerPort": 80
        });

        let (status, body) = send(&router, "POST", "/api/deploy", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(engine.container("web").unwrap().running);

        let (status, body) = send(&router, "GET", "/api/applications", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "web");
        assert_eq!(body[0]["status"], "running");

        let (status, body) =
            send(&router, "GET", "/api/applications/web/deployments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["status"], "success");
        assert_eq!(body[0]["triggerType"], "api");

        let (status, body) =
            send(&router, "GET", "/api/applications/nope/deployments", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_deploy_validation_status() {
        let (router, engine) = app();
        let request = json!({"image": "nginx", "hostPort": 70000, "containerPort": 80});

        let (status, body) = send(&router, "POST", "/api/deploy", Some(request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 422);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_secret_lifecycle() {
        let (router, _) = app();
        let (status, created) = send(
            &router,
            "POST",
            "/api/secrets",
            Some(json!({"groupId": 1, "name": "db", "value": "hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.get("value").is_none());
        let id = created["id"].as_i64().unwrap();

        let (_, hidden) = send(&router, "GET", &format!("/api/secrets/{}", id), None).await;
        assert!(hidden.get("value").is_none());
        let (_, revealed) =
            send(&router, "GET", &format!("/api/secrets/{}?reveal=true", id), None).await;
        assert_eq!(revealed["value"], "hunter2");

        let (status, _) = send(
            &router,
            "POST",
            "/api/env",
            Some(json!({
                "scope": "global",
                "key": "DB_PASSWORD",
                "valueType": "secretRef",
                "secretId": id
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&router, "DELETE", &format!("/api/secrets/{}", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
    }

    #[tokio::test]
    async fn test_registry_default_switch() {
        let (router, _) = app();
        let registry = |name: &str| {
            json!({
                "name": name,
                "registryUrl": format!("https://{}.example.com", name),
                "authType": "token",
                "token": "t",
                "isDefault": true
            })
        };

        let (status, first) = send(&router, "POST", "/api/registries", Some(registry("a"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(first.get("token").is_none());
        send(&router, "POST", "/api/registries", Some(registry("b"))).await;

        let first_id = first["id"].as_i64().unwrap();
        let (status, promoted) = send(
            &router,
            "POST",
            &format!("/api/registries/{}/default", first_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(promoted["isDefault"], true);

        let (_, all) = send(&router, "GET", "/api/registries", None).await;
        let defaults = all
            .as_array()
            .unwrap()
            .iter()
            .filter(|r| r["isDefault"] == true)
            .count();
        assert_eq!(defaults, 1);

        let (status, _) = send(
            &router,
            "DELETE",
            &format!("/api/registries/{}", first_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_env_validation_and_preview() {
        let (router, _) = app();
        let (status, _) = send(
            &router,
            "POST",
            "/api/env",
            Some(json!({"scope": "project", "key": "A", "valueType": "plain", "plainValue": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        send(
            &router,
            "POST",
            "/api/env",
            Some(json!({"scope": "project", "projectId": 4, "key": "A", "valueType": "plain", "plainValue": "1"})),
        )
        .await;
        send(
            &router,
            "POST",
            "/api/env",
            Some(json!({"scope": "global", "key": "B", "valueType": "plain", "plainValue": "2"})),
        )
        .await;

        let (status, preview) = send(&router, "GET", "/api/env/preview/4", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["keys"], json!(["A", "B"]));

        let (_, listed) = send(&router, "GET", "/api/env?scope=global", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
