//! The login fallback chain.
//!
//! Credential sources are tried in a fixed order and the first one ArgoCD accepts wins:
//!
//! 1. The explicit username and password from the [`ClientConfig`], when both were supplied. A
//!    rejection ends the chain unless the config says [`ExplicitLoginFailure::FallBack`].
//! 2. The ambient Kubernetes token. Any failure here moves on to the next source.
//! 3. The `argocd-initial-admin-secret` password. This is the last resort, so a failure to read
//!    the secret or to log in with it is returned to the caller.

use crate::config::{ClientConfig, ExplicitLoginFailure};
use crate::constants::{
    ADMIN_SECRET_NAME, ADMIN_SECRET_PASSWORD_FIELD, ADMIN_USERNAME, BEARER_PREFIX,
};
use crate::error::{self, Error, ErrorKind, Result};
use crate::kubernetes::{AmbientTokenProvider, SecretReader};
use crate::transport::{HttpRequest, Method, Transport};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt::{Display, Formatter};

/// The credential source that produced a session token.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CredentialSource {
    /// The username and password given to the client.
    Explicit,
    /// The bearer token of the ambient Kubernetes identity.
    AmbientToken,
    /// The `admin` password from the initial admin secret.
    AdminSecret,
}

impl Display for CredentialSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Explicit => write!(f, "explicit credentials"),
            CredentialSource::AmbientToken => write!(f, "the ambient Kubernetes token"),
            CredentialSource::AdminSecret => write!(f, "the initial admin secret"),
        }
    }
}

/// A successful login.
pub(crate) struct Login {
    pub(crate) token: SecretString,
    pub(crate) source: CredentialSource,
}

/// Where the fallback chain is. A failed chain is an `Err` from [`Authenticator::authenticate`].
enum AuthState {
    TryExplicit,
    TryAmbientToken,
    TryAdminSecret,
    Authenticated(Login),
}

/// The body of `POST /api/v1/session`.
#[derive(Serialize)]
#[serde(untagged)]
enum SessionRequest<'a> {
    Password {
        username: &'a str,
        password: &'a str,
    },
    Token {
        token: &'a str,
    },
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Runs the fallback chain once, borrowing everything it needs from the client under
/// construction.
pub(crate) struct Authenticator<'a> {
    pub(crate) config: &'a ClientConfig,
    pub(crate) transport: &'a dyn Transport,
    pub(crate) ambient: &'a dyn AmbientTokenProvider,
    pub(crate) secrets: &'a dyn SecretReader,
}

impl<'a> Authenticator<'a> {
    pub(crate) fn authenticate(&self) -> Result<Login> {
        let mut state = AuthState::TryExplicit;
        loop {
            state = match state {
                AuthState::TryExplicit => self.try_explicit()?,
                AuthState::TryAmbientToken => self.try_ambient_token(),
                AuthState::TryAdminSecret => self.try_admin_secret()?,
                AuthState::Authenticated(login) => return Ok(login),
            };
        }
    }

    fn try_explicit(&self) -> Result<AuthState> {
        let (username, password) = match self.config.explicit_credentials() {
            Some(credentials) => credentials,
            None => return Ok(self.after_explicit()),
        };
        debug!("Logging in to ArgoCD as '{}'", username);
        let request = SessionRequest::Password {
            username,
            password: password.expose_secret(),
        };
        match self.login(&request) {
            Ok(token) => Ok(authenticated(token, CredentialSource::Explicit)),
            Err(e) => match self.config.explicit_login_failure() {
                ExplicitLoginFailure::Abort => Err(rejected(CredentialSource::Explicit, e)),
                ExplicitLoginFailure::FallBack => {
                    debug!("Login as '{}' failed, falling back: {}", username, e);
                    Ok(self.after_explicit())
                }
            },
        }
    }

    fn after_explicit(&self) -> AuthState {
        if self.config.ambient_token() {
            AuthState::TryAmbientToken
        } else {
            AuthState::TryAdminSecret
        }
    }

    /// Never fails; every problem here is a reason to try the admin secret instead.
    fn try_ambient_token(&self) -> AuthState {
        let token = match self.ambient.ambient_token() {
            Ok(token) => token.and_then(|raw| strip_bearer(raw.expose_secret())),
            Err(e) => {
                debug!("Unable to read the ambient Kubernetes token: {}", e);
                None
            }
        };
        let token = match token {
            Some(token) => token,
            None => {
                debug!("No ambient Kubernetes token is available");
                return AuthState::TryAdminSecret;
            }
        };

        debug!("Logging in to ArgoCD with the ambient Kubernetes token");
        let request = SessionRequest::Token {
            token: token.expose_secret(),
        };
        match self.login(&request) {
            Ok(token) => authenticated(token, CredentialSource::AmbientToken),
            Err(e) => {
                debug!("ArgoCD did not accept the ambient Kubernetes token: {}", e);
                AuthState::TryAdminSecret
            }
        }
    }

    fn try_admin_secret(&self) -> Result<AuthState> {
        let password = self.admin_password()?;
        debug!("Logging in to ArgoCD as '{}'", ADMIN_USERNAME);
        let request = SessionRequest::Password {
            username: ADMIN_USERNAME,
            password: password.expose_secret(),
        };
        let token = self.login(&request).map_err(|e| match e.kind() {
            ErrorKind::Transport => e,
            _ => Error::Authentication {
                source: Box::new(rejected(CredentialSource::AdminSecret, e)),
            },
        })?;
        Ok(authenticated(token, CredentialSource::AdminSecret))
    }

    fn admin_password(&self) -> Result<SecretString> {
        let namespace = self.config.namespace();
        debug!(
            "Reading secret '{}' in namespace '{}'",
            ADMIN_SECRET_NAME, namespace
        );
        let data = self
            .secrets
            .read_secret(namespace, ADMIN_SECRET_NAME)
            .map_err(|e| Error::AdminSecret {
                name: ADMIN_SECRET_NAME.to_string(),
                namespace: namespace.to_string(),
                source: Box::new(e),
            })?;
        let encoded = data
            .get(ADMIN_SECRET_PASSWORD_FIELD)
            .context(error::SecretFieldSnafu {
                name: ADMIN_SECRET_NAME,
                field: ADMIN_SECRET_PASSWORD_FIELD,
            })?;
        decode_password(encoded.expose_secret())
    }

    /// `POST /api/v1/session` and extract the session token.
    fn login(&self, request: &SessionRequest<'_>) -> Result<SecretString> {
        let url = self.config.session_url();
        let body = serde_json::to_string(request).context(error::SerializeSnafu { url: &url })?;
        let response = self
            .transport
            .send(HttpRequest::post(url.as_str(), body))?;
        ensure!(
            response.is_success(),
            error::RequestSnafu {
                method: Method::Post,
                url: &url,
                status: response.status,
                body: response.body.as_str(),
            }
        );
        let session: SessionResponse =
            serde_json::from_str(&response.body).context(error::ResponseSnafu { url: &url })?;
        session
            .token
            .filter(|token| !token.is_empty())
            .map(SecretString::new)
            .context(error::MissingTokenSnafu { url })
    }
}

fn authenticated(token: SecretString, source: CredentialSource) -> AuthState {
    AuthState::Authenticated(Login { token, source })
}

/// Wrap a failed login, except for transport failures which are returned as they are.
fn rejected(credential: CredentialSource, e: Error) -> Error {
    match e.kind() {
        ErrorKind::Transport => e,
        _ => Error::LoginRejected {
            credential,
            source: Box::new(e),
        },
    }
}

/// Remove a literal `Bearer ` prefix. Blank tokens are treated as absent.
fn strip_bearer(raw: &str) -> Option<SecretString> {
    let raw = raw.trim();
    let token = raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim();
    if token.is_empty() {
        None
    } else {
        Some(SecretString::new(token.to_string()))
    }
}

fn decode_password(encoded: &str) -> Result<SecretString> {
    let bytes = base64::decode(encoded.trim()).context(error::Base64DecodeSnafu {
        field: ADMIN_SECRET_PASSWORD_FIELD,
    })?;
    String::from_utf8(bytes)
        .map(SecretString::new)
        .context(error::Utf8Snafu {
            field: ADMIN_SECRET_PASSWORD_FIELD,
        })
}
