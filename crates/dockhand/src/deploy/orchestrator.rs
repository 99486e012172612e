//! Deployment orchestration.
//!
//! One call to [`DeploymentOrchestrator::deploy`] validates the request,
//! records the attempt, pulls the new image, replaces the running container
//! and reports the outcome. The previous container is only touched once the
//! new image is on the host, so a failed pull leaves it serving.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::callback::{CallbackNotifier, CallbackParams, CallbackPayload};
use super::engine::{ContainerSpec, PortMapping, RestartPolicy};
use super::lifecycle::{ContainerLifecycleManager, ReplaceOutcome};
use super::registry_auth::{split_tag, RegistryAuthResolver};
use crate::db::models::{
    Application, ApplicationStatus, ApplicationUpdate, DeploymentStatus, NewApplication,
    NewDeploymentLog, TriggerType,
};
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;
use crate::services::EnvironmentResolver;
use crate::store::Stores;

const DEFAULT_VERSION: &str = "latest";

/// Deployment request as received from a webhook or the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Container name; derived from the image when absent
    #[serde(default)]
    pub name: Option<String>,

    pub image: String,

    /// Image tag; falls back to a tag on `image`, then `latest`
    #[serde(default)]
    pub version: Option<String>,

    pub host_port: i64,

    pub container_port: i64,

    #[serde(default)]
    pub repository_id: Option<i64>,

    /// Extra variables, applied over the stored environment
    #[serde(default, alias = "env")]
    pub extra_env: BTreeMap<String, String>,

    #[serde(default)]
    pub trigger_type: TriggerType,

    /// Defaults to `unless-stopped`
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParams {
    pub name: String,
    pub image: String,
    pub version: String,
    pub host_port: u16,
    pub container_port: u16,
    pub repository_id: Option<i64>,
    pub extra_env: BTreeMap<String, String>,
    pub trigger_type: TriggerType,
    pub restart_policy: RestartPolicy,
}

fn port(label: &str, value: i64) -> AppResult<u16> {
    if (1..=65535).contains(&value) {
        Ok(value as u16)
    } else {
        Err(AppError::Validation(format!(
            "{} must be between 1 and 65535, got {}",
            label, value
        )))
    }
}

/// Docker container names: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl DeploymentRequest {
    /// Container name used when the request names none.
    pub fn derived_name(&self) -> String {
        let image = self.image.trim();
        let image = image.split('@').next().unwrap_or(image);
        split_tag(image)
            .0
            .chars()
            .map(|c| if c == '/' || c == ':' { '-' } else { c })
            .collect()
    }

    /// Name the deployment will run under, before validation.
    pub fn target_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.derived_name(),
        }
    }

    pub fn validate(&self) -> AppResult<DeploymentParams> {
        let raw_image = self.image.trim();
        if raw_image.is_empty() {
            return Err(AppError::Validation("image must not be empty".to_string()));
        }

        let (image, tag) = split_tag(raw_image);
        if image.is_empty() || image.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(format!(
                "image '{}' is not a valid reference",
                raw_image
            )));
        }

        let version = self
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(tag.filter(|t| !t.is_empty()))
            .unwrap_or(DEFAULT_VERSION);
        if version.contains(['/', ':', '@']) || version.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(format!(
                "version '{}' is not a valid tag",
                version
            )));
        }

        let name = self.target_name();
        if !is_valid_container_name(&name) {
            return Err(AppError::Validation(format!(
                "'{}' is not a valid container name",
                name
            )));
        }

        if let Some(key) = self
            .extra_env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(AppError::Validation(format!(
                "Invalid environment key '{}'",
                key
            )));
        }

        Ok(DeploymentParams {
            name,
            image: image.to_string(),
            version: version.to_string(),
            host_port: port("hostPort", self.host_port)?,
            container_port: port("containerPort", self.container_port)?,
            repository_id: self.repository_id,
            extra_env: self.extra_env.clone(),
            trigger_type: self.trigger_type,
            restart_policy: self.restart_policy,
        })
    }
}

/// Outcome of one deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentResult {
    fn succeeded(deployment_id: Uuid, container_id: String) -> Self {
        Self {
            success: true,
            code: 200,
            deployment_id: Some(deployment_id),
            container_id: Some(container_id),
            error: None,
        }
    }

    fn failed(deployment_id: Option<Uuid>, error: &AppError) -> Self {
        Self {
            success: false,
            code: error.status_code().as_u16(),
            deployment_id,
            container_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Records created so far for one attempt, so failures can be recorded.
#[derive(Default)]
struct Progress {
    application_id: Option<i64>,
    log_id: Option<i64>,
}

/// Runs deployments end to end.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    stores: Stores,
    registry: RegistryAuthResolver,
    lifecycle: ContainerLifecycleManager,
    environment: EnvironmentResolver,
    callback: Option<CallbackNotifier>,
}

impl DeploymentOrchestrator {
    pub fn new(
        stores: Stores,
        registry: RegistryAuthResolver,
        lifecycle: ContainerLifecycleManager,
        environment: EnvironmentResolver,
        callback: Option<CallbackNotifier>,
    ) -> Self {
        Self {
            stores,
            registry,
            lifecycle,
            environment,
            callback,
        }
    }

    /// Deploy one container. Never panics and never returns an error: every
    /// failure is folded into the result.
    pub async fn deploy(&self, request: DeploymentRequest) -> DeploymentResult {
        let started_at = Utc::now();

        let params = match request.validate() {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(image = %request.image, error = %e, "Rejected deployment request");
                return DeploymentResult::failed(None, &e);
            }
        };

        let deployment_id = Uuid::new_v4();
        let span = tracing::info_span!("deployment", %deployment_id, app = %params.name);
        self.run(params, deployment_id, started_at)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        params: DeploymentParams,
        deployment_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> DeploymentResult {
        tracing::info!(
            image = %params.image,
            version = %params.version,
            host_port = params.host_port,
            container_port = params.container_port,
            trigger = %params.trigger_type,
            "Deployment started"
        );

        let mut progress = Progress::default();
        let outcome = self
            .execute(&params, deployment_id, started_at, &mut progress)
            .await;
        let finished_at = Utc::now();

        let result = match outcome {
            Ok(container_id) => {
                self.record_success(&params, &progress, finished_at).await;
                tracing::info!(
                    container_id = %container_id,
                    elapsed_ms = (finished_at - started_at).num_milliseconds(),
                    "Deployment succeeded"
                );
                DeploymentResult::succeeded(deployment_id, container_id)
            }
            Err(e) => {
                self.record_failure(&progress, &e, finished_at).await;
                tracing::error!(error = %e, "Deployment failed");
                DeploymentResult::failed(Some(deployment_id), &e)
            }
        };

        self.notify(&params, &result, deployment_id, started_at, finished_at);
        result
    }

    async fn execute(
        &self,
        params: &DeploymentParams,
        deployment_id: Uuid,
        started_at: DateTime<Utc>,
        progress: &mut Progress,
    ) -> AppResult<String> {
        let application = self.ensure_application(params).await?;
        progress.application_id = Some(application.id);

        let log_id = self
            .stores
            .deployment_logs
            .create(NewDeploymentLog {
                application_id: application.id,
                deployment_id,
                version: params.version.clone(),
                trigger_type: params.trigger_type,
                started_at,
            })
            .await?;
        progress.log_id = Some(log_id);

        self.stores
            .applications
            .update(
                application.id,
                ApplicationUpdate::status(ApplicationStatus::Deploying),
            )
            .await?;

        let resolved = self
            .registry
            .resolve(&params.image, &params.version, params.repository_id)
            .await?;

        self.lifecycle
            .pull(&resolved.reference, resolved.auth.as_ref())
            .await?;

        // Resolved before the old container is touched, so a store outage
        // fails the deployment while the previous instance keeps serving.
        let env = self
            .build_environment(application.id, &params.extra_env)
            .await?;

        if let ReplaceOutcome::Replaced { previous_id } =
            self.lifecycle.replace_existing(&params.name).await?
        {
            tracing::info!(previous_id = %previous_id, "Previous container replaced");
        }

        let spec = ContainerSpec {
            name: params.name.clone(),
            image: resolved.reference,
            env,
            ports: vec![PortMapping {
                host: params.host_port,
                container: params.container_port,
            }],
            restart_policy: params.restart_policy,
        };
        self.lifecycle.create_and_start(&spec).await
    }

    async fn ensure_application(&self, params: &DeploymentParams) -> AppResult<Application> {
        if let Some(existing) = self.stores.applications.get_by_name(&params.name).await? {
            return Ok(existing);
        }

        let created = self
            .stores
            .applications
            .create(NewApplication {
                name: params.name.clone(),
                image: params.image.clone(),
                version: params.version.clone(),
                host_port: params.host_port,
                container_port: params.container_port,
                repository_id: params.repository_id,
            })
            .await;

        match created {
            Ok(application) => {
                tracing::info!(application_id = application.id, "Registered application");
                Ok(application)
            }
            // Lost a race with another writer for the same name.
            Err(AppError::Conflict(_)) => self
                .stores
                .applications
                .get_by_name(&params.name)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!("Application '{}' vanished", params.name))
                }),
            Err(e) => Err(e),
        }
    }

    /// Stored environment overlaid with the request's variables.
    ///
    /// Keys that fail to resolve are skipped; only a failed lookup of the
    /// stored entries fails the deployment.
    async fn build_environment(
        &self,
        application_id: i64,
        extra: &BTreeMap<String, String>,
    ) -> AppResult<BTreeMap<String, String>> {
        let build = self
            .environment
            .build_for_application(application_id)
            .await
            .map_err(|e| AppError::Environment(format!("Failed to load stored environment: {}", e)))?;
        if !build.skipped.is_empty() {
            tracing::warn!(
                skipped = build.skipped.len(),
                "Some environment keys were not resolved"
            );
        }

        let mut env = build.values;
        env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(env)
    }

    async fn record_success(
        &self,
        params: &DeploymentParams,
        progress: &Progress,
        finished_at: DateTime<Utc>,
    ) {
        if let Some(application_id) = progress.application_id {
            let update = ApplicationUpdate {
                status: Some(ApplicationStatus::Running),
                last_deployed_at: Some(finished_at),
                version: Some(params.version.clone()),
                image: Some(params.image.clone()),
                host_port: Some(params.host_port),
                container_port: Some(params.container_port),
                repository_id: Some(params.repository_id),
            };
            let _ = self
                .stores
                .applications
                .update(application_id, update)
                .await
                .log("recording deployed application");
        }

        if let Some(log_id) = progress.log_id {
            let _ = self
                .stores
                .deployment_logs
                .complete(log_id, DeploymentStatus::Success, None, finished_at)
                .await
                .log("completing deployment log");
        }

        self.lifecycle.prune_dangling_images().await;
    }

    async fn record_failure(&self, progress: &Progress, error: &AppError, finished_at: DateTime<Utc>) {
        if let Some(application_id) = progress.application_id {
            let _ = self
                .stores
                .applications
                .update(
                    application_id,
                    ApplicationUpdate::status(ApplicationStatus::Failed),
                )
                .await
                .log("marking application failed");
        }

        if let Some(log_id) = progress.log_id {
            let _ = self
                .stores
                .deployment_logs
                .complete(
                    log_id,
                    DeploymentStatus::Failed,
                    Some(error.to_string()),
                    finished_at,
                )
                .await
                .log("completing deployment log");
        }
    }

    fn notify(
        &self,
        params: &DeploymentParams,
        result: &DeploymentResult,
        deployment_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) {
        let Some(ref callback) = self.callback else {
            return;
        };

        callback.notify(CallbackPayload {
            success: result.success,
            code: result.code,
            deployment_id,
            error: result.error.clone(),
            started_at,
            finished_at,
            params: CallbackParams {
                name: params.name.clone(),
                image: params.image.clone(),
                version: params.version.clone(),
                host_port: params.host_port,
                container_port: params.container_port,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use async_trait::async_trait;

    use super::*;
    use crate::crypto::SecretCipher;
    use crate::db::models::{
        EnvEntryRequest, EnvScope, EnvironmentEntry, NewSecret, RegistryAuthType,
        RegistryCredentialRequest, SecretSource,
    };
    use crate::deploy::engine::EngineError;
    use crate::deploy::lifecycle::LifecycleOptions;
    use crate::deploy::registry_auth::OAUTH2_TOKEN_USERNAME;
    use crate::store::{
        ApplicationStore, DeploymentLogStore, EnvEntryStore, MemoryStore, RepositoryStore,
        SecretStore,
    };
    use crate::testing::{memory_stores, test_cipher, EngineCall, FakeEngine};

    struct Harness {
        engine: Arc<FakeEngine>,
        store: Arc<MemoryStore>,
        cipher: SecretCipher,
        orchestrator: DeploymentOrchestrator,
    }

    fn harness_with(callback: Option<CallbackNotifier>) -> Harness {
        let engine = Arc::new(FakeEngine::new());
        let (store, stores) = memory_stores();
        let cipher = test_cipher();

        let orchestrator = DeploymentOrchestrator::new(
            stores.clone(),
            RegistryAuthResolver::new(stores.repositories.clone(), None),
            ContainerLifecycleManager::new(engine.clone(), LifecycleOptions::default()),
            EnvironmentResolver::new(
                stores.env_entries.clone(),
                stores.secrets.clone(),
                cipher.clone(),
            ),
            callback,
        );

        Harness {
            engine,
            store,
            cipher,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(None)
    }

    fn request(image: &str) -> DeploymentRequest {
        DeploymentRequest {
            name: Some("web".to_string()),
            image: image.to_string(),
            version: None,
            host_port: 8080,
            container_port: 80,
            repository_id: None,
            extra_env: BTreeMap::new(),
            trigger_type: TriggerType::Webhook,
            restart_policy: RestartPolicy::default(),
        }
    }

    async fn application(h: &Harness, name: &str) -> Application {
        ApplicationStore::get_by_name(h.store.as_ref(), name)
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_validation_rules() {
        let mut req = request("nginx:alpine");
        let params = req.validate().unwrap();
        assert_eq!(params.image, "nginx");
        assert_eq!(params.version, "alpine");

        req.version = Some("1.27".to_string());
        assert_eq!(req.validate().unwrap().version, "1.27");

        req.host_port = 0;
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
        req.host_port = 70000;
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));

        let mut req = request("  ");
        req.name = None;
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_request_reads_extra_env() {
        let req: DeploymentRequest = serde_json::from_value(serde_json::json!({
            "image": "nginx",
            "hostPort": 8080,
            "containerPort": 80,
            "extraEnv": {"FEATURE_X": "on"}
        }))
        .unwrap();

        assert_eq!(req.extra_env["FEATURE_X"], "on");
        assert_eq!(req.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(req.validate().unwrap().extra_env["FEATURE_X"], "on");
    }

    #[tokio::test]
    async fn test_requested_restart_policy_reaches_engine() {
        let h = harness();
        let req: DeploymentRequest = serde_json::from_value(serde_json::json!({
            "name": "worker",
            "image": "acme/worker",
            "hostPort": 9000,
            "containerPort": 9000,
            "restartPolicy": "on-failure"
        }))
        .unwrap();

        let result = h.orchestrator.deploy(req).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            h.engine.last_spec().unwrap().restart_policy,
            RestartPolicy::OnFailure
        );

        let h = harness();
        h.orchestrator.deploy(request("nginx")).await;
        assert_eq!(
            h.engine.last_spec().unwrap().restart_policy,
            RestartPolicy::UnlessStopped
        );
    }

    #[test]
    fn test_name_derived_from_image() {
        let mut req = request("ghcr.io/acme/api:v2");
        req.name = None;

        let params = req.validate().unwrap();
        assert_eq!(params.name, "ghcr.io-acme-api");
        assert_eq!(params.image, "ghcr.io/acme/api");
        assert_eq!(params.version, "v2");

        req.name = Some("bad name!".to_string());
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn test_rejected_request_has_no_side_effects() {
        let h = harness();
        let mut req = request("nginx");
        req.container_port = -1;

        let result = h.orchestrator.deploy(req).await;
        assert!(!result.success);
        assert_eq!(result.code, 422);
        assert!(result.deployment_id.is_none());
        assert!(h.engine.calls().is_empty());
        assert!(ApplicationStore::list(h.store.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_deploy() {
        let h = harness();
        let result = h.orchestrator.deploy(request("nginx:alpine")).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.code, 200);
        let container_id = result.container_id.unwrap();
        assert_eq!(
            h.engine.calls(),
            vec![
                EngineCall::Pull("nginx:alpine".to_string()),
                EngineCall::Find("web".to_string()),
                EngineCall::Create("web".to_string()),
                EngineCall::Start(container_id.clone()),
            ]
        );
        assert!(h.engine.container("web").unwrap().running);

        let app = application(&h, "web").await;
        assert_eq!(app.status, ApplicationStatus::Running);
        assert_eq!(app.version, "alpine");
        assert!(app.last_deployed_at.is_some());

        let logs = h.store.list_for_application(app.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeploymentStatus::Success);
        assert_eq!(logs[0].trigger_type, TriggerType::Webhook);
        assert_eq!(Some(logs[0].deployment_id), result.deployment_id);
        assert!(logs[0].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_digest_reference_pulled_as_is() {
        let h = harness();
        let result = h.orchestrator.deploy(request("nginx@sha256:0123abcd")).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            h.engine.calls()[0],
            EngineCall::Pull("nginx@sha256:0123abcd".to_string())
        );
        assert_eq!(h.engine.last_spec().unwrap().image, "nginx@sha256:0123abcd");
    }

    #[tokio::test]
    async fn test_replaces_running_container_after_pull() {
        let h = harness();
        h.engine.add_container("web", true);
        let old_id = h.engine.container("web").unwrap().id;

        let result = h.orchestrator.deploy(request("nginx:1.27")).await;
        assert!(result.success);

        let calls = h.engine.calls();
        let position = |call: &EngineCall| calls.iter().position(|c| c == call).unwrap();
        assert!(position(&EngineCall::Pull("nginx:1.27".to_string())) < position(&EngineCall::Stop("web".to_string())));
        assert!(position(&EngineCall::Stop("web".to_string())) < position(&EngineCall::Remove("web".to_string())));
        assert!(position(&EngineCall::Remove("web".to_string())) < position(&EngineCall::Create("web".to_string())));

        let current = h.engine.container("web").unwrap();
        assert_ne!(current.id, old_id);
        assert!(current.running);
    }

    #[tokio::test]
    async fn test_failed_pull_leaves_old_container_running() {
        let h = harness();
        h.engine.add_container("web", true);
        h.engine.fail_pull("manifest for nginx:nope not found");
        let old = h.engine.container("web").unwrap();

        let mut req = request("nginx");
        req.version = Some("nope".to_string());
        let result = h.orchestrator.deploy(req).await;

        assert!(!result.success);
        assert_eq!(result.code, 502);
        assert!(result.error.unwrap().contains("manifest"));
        assert_eq!(h.engine.container("web"), Some(old));
        assert!(!h.engine.calls().contains(&EngineCall::Stop("web".to_string())));

        let app = application(&h, "web").await;
        assert_eq!(app.status, ApplicationStatus::Failed);
        let logs = h.store.list_for_application(app.id).await.unwrap();
        assert_eq!(logs[0].status, DeploymentStatus::Failed);
        assert!(logs[0].error_message.as_deref().unwrap().contains("manifest"));
    }

    #[tokio::test]
    async fn test_start_failure_is_lifecycle_error() {
        let h = harness();
        h.engine.fail_start("port is already allocated");

        let result = h.orchestrator.deploy(request("nginx")).await;
        assert!(!result.success);
        assert_eq!(result.code, 500);

        let app = application(&h, "web").await;
        let logs = h.store.list_for_application(app.id).await.unwrap();
        assert_eq!(logs[0].status, DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_remove_failure_aborts_before_create() {
        let h = harness();
        h.engine.add_container("web", false);
        h.engine.fail_remove_with(|| EngineError::Api {
            status: 500,
            message: "removal in progress".to_string(),
        });

        let result = h.orchestrator.deploy(request("nginx")).await;
        assert!(!result.success);
        assert!(!h.engine.calls().contains(&EngineCall::Create("web".to_string())));
    }

    #[tokio::test]
    async fn test_environment_is_merged() {
        let h = harness();
        let secret = SecretStore::create(
            h.store.as_ref(),
            NewSecret {
                group_id: 1,
                name: "db".to_string(),
                encrypted_value: h.cipher.encrypt("postgres://db/app").unwrap(),
                source: SecretSource::Manual,
            },
        )
        .await
        .unwrap();

        // The application must exist before project-scoped entries point at it.
        h.orchestrator.deploy(request("nginx")).await;
        let app = application(&h, "web").await;

        for entry in [
            EnvEntryRequest::plain(EnvScope::Global, None, "LOG_LEVEL", "info"),
            EnvEntryRequest::plain(EnvScope::Project, Some(app.id), "LOG_LEVEL", "debug"),
            EnvEntryRequest::secret_ref(EnvScope::Project, Some(app.id), "DATABASE_URL", secret.id),
            EnvEntryRequest::secret_ref(EnvScope::Global, None, "BROKEN", 9999),
        ] {
            h.store.upsert(entry).await.unwrap();
        }

        let mut req = request("nginx");
        req.extra_env.insert("EXTRA".to_string(), "1".to_string());
        let result = h.orchestrator.deploy(req).await;
        assert!(result.success);

        let env = h.engine.last_spec().unwrap().env;
        assert_eq!(env["LOG_LEVEL"], "debug");
        assert_eq!(env["DATABASE_URL"], "postgres://db/app");
        assert_eq!(env["EXTRA"], "1");
        assert!(!env.contains_key("BROKEN"));
    }

    struct UnavailableEntries;

    #[async_trait]
    impl EnvEntryStore for UnavailableEntries {
        async fn list_for_scope(
            &self,
            _scope: EnvScope,
            _project_id: Option<i64>,
        ) -> AppResult<Vec<EnvironmentEntry>> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn list_all(&self) -> AppResult<Vec<EnvironmentEntry>> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn upsert(&self, _request: EnvEntryRequest) -> AppResult<EnvironmentEntry> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn delete(&self, _id: i64) -> AppResult<bool> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn count_secret_references(&self, _secret_id: i64) -> AppResult<i64> {
            Err(AppError::Internal("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_environment_outage_keeps_old_container() {
        let engine = Arc::new(FakeEngine::new());
        engine.add_container("web", true);
        let old_id = engine.container("web").unwrap().id;

        let (store, mut stores) = memory_stores();
        stores.env_entries = Arc::new(UnavailableEntries);
        let orchestrator = DeploymentOrchestrator::new(
            stores.clone(),
            RegistryAuthResolver::new(stores.repositories.clone(), None),
            ContainerLifecycleManager::new(engine.clone(), LifecycleOptions::default()),
            EnvironmentResolver::new(
                stores.env_entries.clone(),
                stores.secrets.clone(),
                test_cipher(),
            ),
            None,
        );

        let result = orchestrator.deploy(request("nginx")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("stored environment"));

        let container = engine.container("web").unwrap();
        assert_eq!(container.id, old_id);
        assert!(container.running);
        assert!(!engine.calls().contains(&EngineCall::Stop("web".to_string())));

        let app = ApplicationStore::get_by_name(store.as_ref(), "web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Failed);
    }

    #[tokio::test]
    async fn test_repository_credentials_used_for_pull() {
        let h = harness();
        let registry = RepositoryStore::create(
            h.store.as_ref(),
            RegistryCredentialRequest {
                name: "gar".to_string(),
                registry_url: "https://europe-docker.pkg.dev".to_string(),
                auth_type: RegistryAuthType::Token,
                username: None,
                password: None,
                token: Some("ya29.x".to_string()),
                is_default: false,
            },
        )
        .await
        .unwrap();

        let mut req = request("proj/repo/api");
        req.version = Some("v5".to_string());
        req.repository_id = Some(registry.id);
        let result = h.orchestrator.deploy(req).await;

        assert!(result.success);
        assert!(h
            .engine
            .calls()
            .contains(&EngineCall::Pull("europe-docker.pkg.dev/proj/repo/api:v5".to_string())));
        let auth = h.engine.last_auth().unwrap();
        assert_eq!(auth.username, OAUTH2_TOKEN_USERNAME);
        assert_eq!(application(&h, "web").await.repository_id, Some(registry.id));
    }

    #[tokio::test]
    async fn test_redeploy_keeps_one_application_and_logs_each_attempt() {
        let h = harness();
        assert!(h.orchestrator.deploy(request("nginx:1.26")).await.success);
        assert!(h.orchestrator.deploy(request("nginx:1.27")).await.success);

        let apps = ApplicationStore::list(h.store.as_ref()).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].version, "1.27");

        let logs = h.store.list_for_application(apps[0].id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].version, "1.27");
    }

    #[tokio::test]
    async fn test_callback_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let callback =
            CallbackNotifier::new(&server.uri(), Some("k".to_string()), Duration::from_secs(5))
                .unwrap();
        let h = harness_with(Some(callback));
        h.engine.fail_pull("denied");

        let result = h.orchestrator.deploy(request("nginx")).await;
        assert!(!result.success);

        let mut requests = Vec::new();
        for _ in 0..50 {
            requests = server.received_requests().await.unwrap();
            if !requests.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(requests.len(), 1);

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 502);
        assert_eq!(body["params"]["name"], "web");
        assert_eq!(
            body["deploymentId"],
            result.deployment_id.unwrap().to_string()
        );
    }
}
