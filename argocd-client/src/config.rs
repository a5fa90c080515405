use crate::constants::{
    API_SESSION, DEFAULT_NAMESPACE, DEFAULT_SERVER_SERVICE, DEFAULT_TIMEOUT_SECS, ENV_PREFIX,
};
use crate::error::{self, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use snafu::{ensure, ResultExt};
use std::time::Duration;
use url::Url;

/// What to do when ArgoCD rejects an explicitly supplied username and password.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplicitLoginFailure {
    /// Fail construction with the login error.
    #[default]
    Abort,
    /// Continue with the ambient Kubernetes token and then the initial admin secret.
    FallBack,
}

/// The settings an [`ArgoCdClient`](crate::ArgoCdClient) is constructed from.
///
/// A `ClientConfig` can be created with [`ClientConfig::builder`], read from `ARGOCD_*`
/// environment variables with [`ClientConfig::from_env`], or deserialized from a larger
/// configuration document (camelCase keys, every key optional) and checked with
/// [`ClientConfig::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    /// The ArgoCD server URL. When absent, `https://argocd-server.<namespace>.svc` is used.
    #[serde(default)]
    host: Option<String>,
    /// The namespace ArgoCD is installed in. The initial admin secret is read from here.
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<SecretString>,
    /// The kubeconfig context to load. When absent the current context, or the in-cluster
    /// service account, is used.
    #[serde(default)]
    context: Option<String>,
    #[serde(default = "default_true")]
    verify_tls: bool,
    #[serde(
        default = "default_timeout",
        rename = "timeoutSeconds",
        deserialize_with = "deserialize_seconds"
    )]
    timeout: Duration,
    #[serde(default)]
    explicit_login_failure: ExplicitLoginFailure,
    /// Whether to try the ambient Kubernetes token before the initial admin secret.
    #[serde(default = "default_true")]
    ambient_token: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            namespace: default_namespace(),
            username: None,
            password: None,
            context: None,
            verify_tls: true,
            timeout: default_timeout(),
            explicit_login_failure: ExplicitLoginFailure::default(),
            ambient_token: true,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read the configuration from the process environment. Recognized variables are
    /// `ARGOCD_SERVER`, `ARGOCD_NAMESPACE`, `ARGOCD_USERNAME`, `ARGOCD_PASSWORD`,
    /// `ARGOCD_KUBE_CONTEXT`, `ARGOCD_INSECURE` (`true` or `1` disables TLS verification, `false`
    /// or `0` keeps it) and `ARGOCD_TIMEOUT_SECS`.
    ///
    /// `ARGOCD_SERVER` may be a full URL or a bare `host[:port]` as used by the `argocd` CLI, in
    /// which case `https://` is assumed.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Like [`ClientConfig::from_env`] but reads the variables from `vars`.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings: EnvSettings = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(error::EnvironmentSnafu)?;

        let mut builder = Self::builder().verify_tls(!settings.insecure);
        if let Some(server) = settings.server {
            builder = builder.host(server_url(server));
        }
        if let Some(namespace) = settings.namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(username) = settings.username {
            builder = builder.username(username);
        }
        if let Some(password) = settings.password {
            builder = builder.password(password);
        }
        if let Some(context) = settings.kube_context {
            builder = builder.context(context);
        }
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.namespace.trim().is_empty(),
            error::ConfigurationSnafu {
                message: "namespace must not be empty"
            }
        );
        ensure!(
            self.username.is_some() == self.password.is_some(),
            error::ConfigurationSnafu {
                message: "username and password must be supplied together"
            }
        );
        ensure!(
            self.username.as_deref().map(str::is_empty) != Some(true),
            error::ConfigurationSnafu {
                message: "username must not be empty"
            }
        );
        ensure!(
            !self.timeout.is_zero(),
            error::ConfigurationSnafu {
                message: "timeout must be greater than zero"
            }
        );

        let base_url = self.base_url();
        let url = Url::parse(&base_url).context(error::InvalidUrlSnafu { url: &base_url })?;
        ensure!(
            matches!(url.scheme(), "http" | "https") && url.has_host(),
            error::ConfigurationSnafu {
                message: format!("'{}' is not an http or https URL", base_url)
            }
        );
        Ok(())
    }

    /// The ArgoCD server URL without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.{}.svc",
                DEFAULT_SERVER_SERVICE, self.namespace
            ),
        }
    }

    pub(crate) fn session_url(&self) -> String {
        format!("{}{}", self.base_url(), API_SESSION)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn explicit_login_failure(&self) -> ExplicitLoginFailure {
        self.explicit_login_failure
    }

    pub fn ambient_token(&self) -> bool {
        self.ambient_token
    }

    /// The username and password pair, if both were supplied.
    pub(crate) fn explicit_credentials(&self) -> Option<(&str, &SecretString)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password)),
            _ => None,
        }
    }
}

/// Builds a validated [`ClientConfig`]. Anything not set keeps the `ClientConfig` default.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = Some(host.into());
        self
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set both halves of the explicit credential pair.
    pub fn credentials<S1, S2>(self, username: S1, password: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.username(username).password(password)
    }

    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = Some(username.into());
        self
    }

    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.config.password = Some(SecretString::new(password.into()));
        self
    }

    pub fn context<S: Into<String>>(mut self, context: S) -> Self {
        self.config.context = Some(context.into());
        self
    }

    pub fn verify_tls(mut self, verify_tls: bool) -> Self {
        self.config.verify_tls = verify_tls;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn explicit_login_failure(mut self, policy: ExplicitLoginFailure) -> Self {
        self.config.explicit_login_failure = policy;
        self
    }

    pub fn ambient_token(mut self, enabled: bool) -> Self {
        self.config.ambient_token = enabled;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The `ARGOCD_*` environment variables, with the prefix removed and lowercased by `envy`.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    server: Option<String>,
    namespace: Option<String>,
    username: Option<String>,
    password: Option<String>,
    kube_context: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    insecure: bool,
    timeout_secs: Option<u64>,
}

/// We need these to provide defaults for serde.
fn default_namespace() -> String {
    String::from(DEFAULT_NAMESPACE)
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

fn default_true() -> bool {
    true
}

/// Accepts `true`/`1` and `false`/`0`, ignoring case.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(&value),
            &"one of true, false, 1 or 0",
        )),
    }
}

/// `server` unchanged if it names a scheme, otherwise as an `https` URL.
fn server_url(server: String) -> String {
    if server.contains("://") {
        server
    } else {
        format!("https://{}", server)
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
