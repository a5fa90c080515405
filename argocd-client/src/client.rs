use crate::auth::{Authenticator, CredentialSource};
use crate::config::ClientConfig;
use crate::constants::{
    ACTION_REFRESH, ACTION_SYNC, API_APPLICATIONS, API_CLUSTERS, API_PROJECTS,
};
use crate::error::{self, Error, Result};
use crate::kubernetes::{AmbientTokenProvider, KubeCluster, SecretReader};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use log::{info, warn};
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use snafu::{ensure, ResultExt};
use std::fmt::{Debug, Formatter};
use url::Url;

/// An ArgoCD `Application`, as returned by the API. Its schema is not interpreted.
pub type Application = Value;
/// An ArgoCD `Cluster`, as returned by the API. Its schema is not interpreted.
pub type Cluster = Value;
/// An ArgoCD `AppProject`, as returned by the API. Its schema is not interpreted.
pub type Project = Value;

/// The bearer token of an authenticated ArgoCD session. It is attached to every request the
/// client makes after construction and never changes.
pub struct Session {
    token: SecretString,
}

impl Session {
    fn authorization(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// The `{"items": [...]}` envelope of ArgoCD list responses. ArgoCD sends `null` or omits `items`
/// when the list is empty.
#[derive(Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Option<Vec<Value>>,
}

/// A client for the ArgoCD REST API that authenticates once, during construction.
///
/// Construction tries the explicit username and password, then the ambient Kubernetes token, then
/// the `argocd-initial-admin-secret`, and fails if none of them produces a session token. After
/// that the client is immutable, so it can be shared between threads.
///
/// ```no_run
/// use argocd_client::{ArgoCdClient, ClientConfig};
///
/// # fn main() -> argocd_client::Result<()> {
/// let config = ClientConfig::builder()
///     .host("https://argocd.example.com")
///     .build()?;
/// let client = ArgoCdClient::new(config)?;
/// for app in client.list_applications()? {
///     println!("{}", app["metadata"]["name"]);
/// }
/// client.sync_application("guestbook")?;
/// # Ok(())
/// # }
/// ```
pub struct ArgoCdClient {
    base_url: String,
    verify_tls: bool,
    transport: Box<dyn Transport>,
    session: Session,
    credential_source: CredentialSource,
}

impl ArgoCdClient {
    /// Load the Kubernetes configuration for the configured context and authenticate to ArgoCD.
    ///
    /// This blocks and must not be called from within an async runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let cluster = KubeCluster::load(config.context())?;
        let transport = ReqwestTransport::new(config.verify_tls(), config.timeout())?;
        Self::with_parts(config, Box::new(transport), &cluster, &cluster)
    }

    /// Authenticate to ArgoCD using the given collaborators instead of the defaults. `transport`
    /// is kept for every later request; `ambient` and `secrets` are only used during
    /// authentication.
    ///
    /// `transport` must verify TLS certificates exactly when `config.verify_tls()` is set.
    pub fn with_parts(
        config: ClientConfig,
        transport: Box<dyn Transport>,
        ambient: &dyn AmbientTokenProvider,
        secrets: &dyn SecretReader,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(
            transport.verifies_tls() == config.verify_tls(),
            error::ConfigurationSnafu {
                message: format!(
                    "verify_tls is {} but the transport {} TLS certificates",
                    config.verify_tls(),
                    if transport.verifies_tls() {
                        "verifies"
                    } else {
                        "does not verify"
                    }
                )
            }
        );
        let base_url = config.base_url();
        if !transport.verifies_tls() {
            // Logged once here rather than for every request.
            warn!(
                "TLS certificate verification is disabled for ArgoCD at '{}'",
                base_url
            );
        }

        let login = Authenticator {
            config: &config,
            transport: transport.as_ref(),
            ambient,
            secrets,
        }
        .authenticate()?;
        info!("Authenticated to ArgoCD at '{}' using {}", base_url, login.source);

        Ok(Self {
            base_url,
            verify_tls: transport.verifies_tls(),
            transport,
            session: Session { token: login.token },
            credential_source: login.source,
        })
    }

    /// The credential source that authenticated this client.
    pub fn credential_source(&self) -> CredentialSource {
        self.credential_source
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the server's TLS certificate is verified.
    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn list_applications(&self) -> Result<Vec<Application>> {
        self.list(API_APPLICATIONS)
    }

    pub fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.list(API_CLUSTERS)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.list(API_PROJECTS)
    }

    /// Ask ArgoCD to refresh the application `name` from its source.
    pub fn refresh_application(&self, name: &str) -> Result<()> {
        self.application_action(name, ACTION_REFRESH)
    }

    /// Ask ArgoCD to sync the application `name` to its target state.
    pub fn sync_application(&self, name: &str) -> Result<()> {
        self.application_action(name, ACTION_SYNC)
    }

    fn list(&self, path: &str) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send(HttpRequest::get(url.as_str()))?;
        let list: ItemList =
            serde_json::from_str(&response.body).context(error::ResponseSnafu { url })?;
        Ok(list.items.unwrap_or_default())
    }

    fn application_action(&self, name: &str, action: &str) -> Result<()> {
        let url = application_url(&self.base_url, name, action)?;
        self.send(HttpRequest::post(url, "{}"))?;
        Ok(())
    }

    /// Attach the session token, send, and turn non-2xx responses into [`Error::Request`].
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();
        let request = request.with_header(AUTHORIZATION.as_str(), self.session.authorization());
        let response = self.transport.send(request)?;
        ensure!(
            response.is_success(),
            error::RequestSnafu {
                method,
                url,
                status: response.status,
                body: response.body.as_str(),
            }
        );
        Ok(response)
    }
}

impl Debug for ArgoCdClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoCdClient")
            .field("base_url", &self.base_url)
            .field("verify_tls", &self.verify_tls)
            .field("session", &self.session)
            .field("credential_source", &self.credential_source)
            .finish()
    }
}

/// `<base_url>/api/v1/applications/<name>/<action>`, with `name` percent-encoded as a single
/// path segment.
fn application_url(base_url: &str, name: &str, action: &str) -> Result<String> {
    ensure!(
        !matches!(name, "" | "." | ".."),
        error::ConfigurationSnafu {
            message: format!("'{}' is not a valid application name", name)
        }
    );
    let applications = format!("{}{}", base_url, API_APPLICATIONS);
    let mut url = Url::parse(&applications).context(error::InvalidUrlSnafu {
        url: &applications,
    })?;
    url.path_segments_mut()
        .map_err(|_| Error::Configuration {
            message: format!("'{}' cannot be used as a base URL", base_url),
        })?
        .push(name)
        .push(action);
    Ok(url.into())
}
