//! Registry reference and credential resolution.
//!
//! Turns `(image, version, repository)` into the fully qualified reference
//! passed to the engine, plus whatever credentials that registry expects.

use std::sync::Arc;

use url::Url;

use super::engine::RegistryAuth;
use crate::db::models::{RegistryAuthType, RegistryCredential, RegistryCredentialRequest};
use crate::error::{AppError, AppResult};
use crate::store::RepositoryStore;

/// Username registries using the OAuth2 access-token convention expect.
pub const OAUTH2_TOKEN_USERNAME: &str = "oauth2accesstoken";

const DOCKER_HUB_HOSTS: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// A registry credential reduced to what each auth type actually uses.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialKind {
    None,
    UsernamePassword { username: String, password: String },
    Token { token: String, username: Option<String> },
}

impl std::fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::None => f.write_str("None"),
            CredentialKind::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .finish_non_exhaustive(),
            CredentialKind::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl CredentialKind {
    /// Build from the loosely typed stored fields, rejecting missing material.
    pub fn from_parts(
        auth_type: RegistryAuthType,
        username: Option<&str>,
        password: Option<&str>,
        token: Option<&str>,
    ) -> AppResult<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        match auth_type {
            RegistryAuthType::None => Ok(CredentialKind::None),
            RegistryAuthType::UsernamePassword => match (present(username), password) {
                (Some(username), Some(password)) if !password.is_empty() => {
                    Ok(CredentialKind::UsernamePassword {
                        username: username.to_string(),
                        password: password.to_string(),
                    })
                }
                _ => Err(AppError::RegistryResolution(
                    "usernamePassword credentials need a username and a password".to_string(),
                )),
            },
            RegistryAuthType::Token => match token.filter(|t| !t.is_empty()) {
                Some(token) => Ok(CredentialKind::Token {
                    token: token.to_string(),
                    username: present(username).map(str::to_string),
                }),
                None => Err(AppError::RegistryResolution(
                    "token credentials need a token".to_string(),
                )),
            },
        }
    }
}

impl TryFrom<&RegistryCredential> for CredentialKind {
    type Error = AppError;

    fn try_from(credential: &RegistryCredential) -> Result<Self, Self::Error> {
        CredentialKind::from_parts(
            credential.auth_type,
            credential.username.as_deref(),
            credential.password.as_deref(),
            credential.token.as_deref(),
        )
    }
}

impl TryFrom<&RegistryCredentialRequest> for CredentialKind {
    type Error = AppError;

    fn try_from(request: &RegistryCredentialRequest) -> Result<Self, Self::Error> {
        CredentialKind::from_parts(
            request.auth_type,
            request.username.as_deref(),
            request.password.as_deref(),
            request.token.as_deref(),
        )
    }
}

/// Hostname (and port) of a registry URL such as `https://ghcr.io/v2/`.
pub fn registry_host(registry_url: &str) -> AppResult<String> {
    let trimmed = registry_url.trim();
    if trimmed.is_empty() {
        return Err(AppError::RegistryResolution(
            "Registry URL is empty".to_string(),
        ));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).map_err(|e| {
        AppError::RegistryResolution(format!("Invalid registry URL '{}': {}", registry_url, e))
    })?;
    let host = url.host_str().ok_or_else(|| {
        AppError::RegistryResolution(format!("Registry URL '{}' has no host", registry_url))
    })?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

pub fn is_docker_hub(host: &str) -> bool {
    DOCKER_HUB_HOSTS.contains(&host.to_ascii_lowercase().as_str())
}

/// Pick the credential shape a registry expects.
///
/// Docker Hub accepts a personal access token as the password of a named
/// user. Cloud registries (GCR, Artifact Registry, ...) expect the token under
/// the fixed `oauth2accesstoken` user instead.
pub fn auth_for_registry(host: &str, credential: &CredentialKind) -> Option<RegistryAuth> {
    match credential {
        CredentialKind::None => None,
        CredentialKind::UsernamePassword { username, password } => Some(RegistryAuth {
            username: username.clone(),
            password: password.clone(),
            server_address: Some(host.to_string()),
        }),
        CredentialKind::Token {
            token,
            username: Some(username),
        } if is_docker_hub(host) => Some(RegistryAuth {
            username: username.clone(),
            password: token.clone(),
            server_address: Some(host.to_string()),
        }),
        CredentialKind::Token { token, .. } => Some(RegistryAuth {
            username: OAUTH2_TOKEN_USERNAME.to_string(),
            password: token.clone(),
            server_address: Some(host.to_string()),
        }),
    }
}

/// Whether an image name already names its registry or namespace.
///
/// `ghcr.io/org/app` and `org/app` are used verbatim; `nginx` and
/// `library/nginx` get the default registry prefix.
pub fn looks_fully_qualified(image: &str) -> bool {
    image.contains('.') || (image.contains('/') && !image.starts_with("library/"))
}

/// Split a trailing `:tag` off an image name, ignoring registry ports.
///
/// Digest references (`name@sha256:...`) carry no tag and come back whole.
pub fn split_tag(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let at = name_start + i;
            (&image[..at], Some(&image[at + 1..]))
        }
        None => (image, None),
    }
}

fn with_version(image: &str, version: &str) -> String {
    if image.contains('@') {
        image.to_string()
    } else {
        format!("{}:{}", image, version)
    }
}

/// Result of resolving an image for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub reference: String,
    pub auth: Option<RegistryAuth>,
    pub registry: Option<String>,
}

/// Resolves image references and registry credentials.
#[derive(Clone)]
pub struct RegistryAuthResolver {
    repositories: Arc<dyn RepositoryStore>,
    default_registry: Option<String>,
}

impl RegistryAuthResolver {
    pub fn new(repositories: Arc<dyn RepositoryStore>, default_registry: Option<String>) -> Self {
        let default_registry = default_registry
            .map(|r| r.trim().trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty());
        Self {
            repositories,
            default_registry,
        }
    }

    /// Resolve the reference and credentials for an image.
    ///
    /// An unknown `repository_id` is not an error: resolution continues with
    /// the default registry credential, then the configured default host.
    pub async fn resolve(
        &self,
        image: &str,
        version: &str,
        repository_id: Option<i64>,
    ) -> AppResult<ResolvedImage> {
        let image = image.trim();
        if image.is_empty() {
            return Err(AppError::Validation("Image must not be empty".to_string()));
        }

        if let Some(id) = repository_id {
            match self.repositories.get_by_id(id).await? {
                Some(credential) => return self.with_repository(image, version, &credential),
                None => tracing::warn!(
                    repository_id = id,
                    image = %image,
                    "Repository not found, falling back to the default registry"
                ),
            }
        }

        let default_credential = self.repositories.get_default().await?;

        if looks_fully_qualified(image) {
            // Default credentials still apply when the image lives on that registry.
            let auth = match default_credential {
                Some(ref credential) => {
                    let host = registry_host(&credential.registry_url)?;
                    if image.starts_with(&format!("{}/", host)) {
                        auth_for_registry(&host, &CredentialKind::try_from(credential)?)
                    } else {
                        None
                    }
                }
                None => None,
            };
            return Ok(ResolvedImage {
                reference: with_version(image, version),
                auth,
                registry: None,
            });
        }

        if let Some(credential) = default_credential {
            return self.with_repository(image, version, &credential);
        }

        Ok(match self.default_registry {
            Some(ref host) => ResolvedImage {
                reference: with_version(&format!("{}/{}", host, image), version),
                auth: None,
                registry: Some(host.clone()),
            },
            None => ResolvedImage {
                reference: with_version(image, version),
                auth: None,
                registry: None,
            },
        })
    }

    fn with_repository(
        &self,
        image: &str,
        version: &str,
        credential: &RegistryCredential,
    ) -> AppResult<ResolvedImage> {
        let host = registry_host(&credential.registry_url)?;
        let kind = CredentialKind::try_from(credential)?;

        let qualified = if image.starts_with(&format!("{}/", host)) {
            image.to_string()
        } else {
            format!("{}/{}", host, image)
        };

        Ok(ResolvedImage {
            reference: with_version(&qualified, version),
            auth: auth_for_registry(&host, &kind),
            registry: Some(host),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn token(username: Option<&str>) -> CredentialKind {
        CredentialKind::Token {
            token: "tok".to_string(),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_docker_hub_token_is_a_password() {
        let auth = auth_for_registry("docker.io", &token(Some("u"))).unwrap();
        assert_eq!(auth.username, "u");
        assert_eq!(auth.password, "tok");
    }

    #[test]
    fn test_other_registries_use_oauth2_convention() {
        let auth = auth_for_registry("europe-docker.pkg.dev", &token(Some("u"))).unwrap();
        assert_eq!(auth.username, OAUTH2_TOKEN_USERNAME);
        assert_eq!(auth.password, "tok");

        let auth = auth_for_registry("docker.io", &token(None)).unwrap();
        assert_eq!(auth.username, OAUTH2_TOKEN_USERNAME);
    }

    #[test]
    fn test_username_password_carries_server_address() {
        let kind = CredentialKind::UsernamePassword {
            username: "deploy".to_string(),
            password: "pw".to_string(),
        };
        let auth = auth_for_registry("registry.example.com", &kind).unwrap();
        assert_eq!(auth.server_address.as_deref(), Some("registry.example.com"));
        assert!(auth_for_registry("registry.example.com", &CredentialKind::None).is_none());
    }

    #[test]
    fn test_from_parts_rejects_missing_material() {
        assert!(CredentialKind::from_parts(RegistryAuthType::Token, Some("u"), None, None).is_err());
        assert!(CredentialKind::from_parts(
            RegistryAuthType::UsernamePassword,
            Some("u"),
            None,
            None
        )
        .is_err());
        assert_eq!(
            CredentialKind::from_parts(RegistryAuthType::None, None, None, None).unwrap(),
            CredentialKind::None
        );
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("https://ghcr.io/v2/").unwrap(), "ghcr.io");
        assert_eq!(registry_host("registry.local:5000").unwrap(), "registry.local:5000");
        assert_eq!(registry_host("docker.io").unwrap(), "docker.io");
        assert!(registry_host("  ").is_err());
    }

    #[test]
    fn test_qualification_rules() {
        assert!(!looks_fully_qualified("nginx"));
        assert!(!looks_fully_qualified("library/nginx"));
        assert!(looks_fully_qualified("ghcr.io/org/app"));
        assert!(looks_fully_qualified("org/app"));
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("nginx:alpine"), ("nginx", Some("alpine")));
        assert_eq!(split_tag("nginx"), ("nginx", None));
        assert_eq!(
            split_tag("nginx@sha256:0123abcd"),
            ("nginx@sha256:0123abcd", None)
        );
        assert_eq!(
            split_tag("registry.local:5000/app"),
            ("registry.local:5000/app", None)
        );
        assert_eq!(
            split_tag("registry.local:5000/app:v2"),
            ("registry.local:5000/app", Some("v2"))
        );
    }

    fn resolver(store: Arc<MemoryStore>, default_registry: Option<&str>) -> RegistryAuthResolver {
        RegistryAuthResolver::new(store, default_registry.map(str::to_string))
    }

    #[tokio::test]
    async fn test_fallback_prefixes_bare_images() {
        let resolver = resolver(Arc::new(MemoryStore::new()), Some("registry.example.com"));

        let resolved = resolver.resolve("nginx", "latest", None).await.unwrap();
        assert_eq!(resolved.reference, "registry.example.com/nginx:latest");
        assert!(resolved.auth.is_none());

        let resolved = resolver.resolve("ghcr.io/org/app", "latest", None).await.unwrap();
        assert_eq!(resolved.reference, "ghcr.io/org/app:latest");
    }

    #[tokio::test]
    async fn test_unknown_repository_falls_back() {
        let resolver = resolver(Arc::new(MemoryStore::new()), Some("registry.example.com"));
        let resolved = resolver.resolve("nginx", "1.27", Some(9999)).await.unwrap();
        assert_eq!(resolved.reference, "registry.example.com/nginx:1.27");
    }

    #[tokio::test]
    async fn test_without_default_host_image_is_used_as_is() {
        let resolver = resolver(Arc::new(MemoryStore::new()), None);
        let resolved = resolver.resolve("nginx", "alpine", None).await.unwrap();
        assert_eq!(resolved.reference, "nginx:alpine");
    }

    #[tokio::test]
    async fn test_repository_prefix_and_auth() {
        let store = Arc::new(MemoryStore::new());
        let credential = RepositoryStore::create(
            store.as_ref(),
            RegistryCredentialRequest {
                name: "artifact".to_string(),
                registry_url: "https://europe-docker.pkg.dev".to_string(),
                auth_type: RegistryAuthType::Token,
                username: Some("svc".to_string()),
                password: None,
                token: Some("ya29.token".to_string()),
                is_default: false,
            },
        )
        .await
        .unwrap();

        let resolved = resolver(store, Some("registry.example.com"))
            .resolve("proj/repo/api", "v3", Some(credential.id))
            .await
            .unwrap();

        assert_eq!(resolved.reference, "europe-docker.pkg.dev/proj/repo/api:v3");
        let auth = resolved.auth.unwrap();
        assert_eq!(auth.username, OAUTH2_TOKEN_USERNAME);
        assert_eq!(auth.password, "ya29.token");
    }

    #[tokio::test]
    async fn test_default_credential_applies_to_bare_images() {
        let store = Arc::new(MemoryStore::new());
        RepositoryStore::create(
            store.as_ref(),
            RegistryCredentialRequest {
                name: "private".to_string(),
                registry_url: "registry.internal".to_string(),
                auth_type: RegistryAuthType::UsernamePassword,
                username: Some("deploy".to_string()),
                password: Some("pw".to_string()),
                token: None,
                is_default: true,
            },
        )
        .await
        .unwrap();

        let resolver = resolver(store, Some("registry.example.com"));
        let resolved = resolver.resolve("api", "latest", None).await.unwrap();
        assert_eq!(resolved.reference, "registry.internal/api:latest");
        assert_eq!(resolved.auth.unwrap().username, "deploy");

        let resolved = resolver
            .resolve("registry.internal/team/api", "v1", None)
            .await
            .unwrap();
        assert_eq!(resolved.reference, "registry.internal/team/api:v1");
        assert!(resolved.auth.is_some());
    }

    #[tokio::test]
    async fn test_empty_image_is_rejected() {
        let resolver = resolver(Arc::new(MemoryStore::new()), None);
        assert!(resolver.resolve("  ", "latest", None).await.is_err());
    }
}
