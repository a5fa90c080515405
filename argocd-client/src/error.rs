use crate::auth::CredentialSource;
use crate::transport::Method;
pub use reqwest::StatusCode;
use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid client configuration: {}", message))]
    Configuration { message: String },

    #[snafu(display("Unable to read ArgoCD settings from the environment: {}", source))]
    Environment { source: envy::Error },

    #[snafu(display("Invalid ArgoCD URL '{}': {}", url, source))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("Unable to build the HTTP client: {}", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display(
        "Unable to load Kubernetes configuration for context '{}': {}",
        context.as_deref().unwrap_or("<current>"),
        source
    ))]
    KubeConfig {
        context: Option<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Unable to create the Kubernetes client: {}", source))]
    KubeClient { source: kube::Error },

    #[snafu(display("Unable to start the Kubernetes client runtime: {}", source))]
    Runtime { source: std::io::Error },

    #[snafu(display("Unable to {}: {}", operation, source))]
    Kubernetes {
        /// What we were trying to do, e.g. `get secret 'argocd-initial-admin-secret'`.
        operation: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Unable to read token file '{}': {}", path, source))]
    TokenFile {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to encode field '{}' of secret '{}': {}", field, name, source))]
    SecretEncode {
        name: String,
        field: String,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Unable to read secret '{}' in namespace '{}': {}",
        name,
        namespace,
        source
    ))]
    AdminSecret {
        name: String,
        namespace: String,
        source: Box<Error>,
    },

    #[snafu(display("Secret '{}' has no '{}' field", name, field))]
    SecretField { name: String, field: String },

    #[snafu(display("Secret field '{}' is not valid base64: {}", field, source))]
    Base64Decode {
        field: String,
        source: base64::DecodeError,
    },

    #[snafu(display("Secret field '{}' is not valid UTF-8: {}", field, source))]
    Utf8 {
        field: String,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("Login response from '{}' did not contain a token", url))]
    MissingToken { url: String },

    #[snafu(display("ArgoCD rejected the login with {}: {}", credential, source))]
    LoginRejected {
        credential: CredentialSource,
        source: Box<Error>,
    },

    #[snafu(display("Failed to authenticate to ArgoCD: {}", source))]
    Authentication { source: Box<Error> },

    #[snafu(display("{} '{}' failed with status {}: {}", method, url, status, body))]
    Request {
        method: Method,
        url: String,
        status: u16,
        body: String,
    },

    #[snafu(display("Unable to send {} request to '{}': {}", method, url, source))]
    Transport {
        method: Method,
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Unable to serialize the request body for '{}': {}", url, source))]
    Serialize {
        url: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to parse the response from '{}': {}", url, source))]
    Response {
        url: String,
        source: serde_json::Error,
    },
}

/// The broad category of an [`Error`], for callers that need to branch on what went wrong rather
/// than on the exact variant.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The client was given input it cannot work with.
    Configuration,
    /// No credential source produced a session token.
    Authentication,
    /// ArgoCD answered a request with a non-2xx status.
    Request,
    /// The request never got an answer (DNS, TLS, connection, timeout).
    Transport,
    /// ArgoCD answered with a body that is not the expected JSON.
    Response,
    /// The Kubernetes API could not be used.
    Kubernetes,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. }
            | Error::Environment { .. }
            | Error::InvalidUrl { .. }
            | Error::HttpClient { .. }
            | Error::KubeConfig { .. } => ErrorKind::Configuration,
            Error::KubeClient { .. }
            | Error::Runtime { .. }
            | Error::Kubernetes { .. }
            | Error::TokenFile { .. }
            | Error::SecretEncode { .. } => ErrorKind::Kubernetes,
            Error::AdminSecret { .. }
            | Error::SecretField { .. }
            | Error::Base64Decode { .. }
            | Error::Utf8 { .. }
            | Error::MissingToken { .. }
            | Error::LoginRejected { .. }
            | Error::Authentication { .. } => ErrorKind::Authentication,
            Error::Request { .. } => ErrorKind::Request,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Serialize { .. } | Error::Response { .. } => ErrorKind::Response,
        }
    }
}

pub trait HttpStatusCode {
    fn status_code(&self) -> Option<StatusCode>;

    fn is_status_code(&self, status_code: StatusCode) -> bool {
        self.status_code()
            .map(|some| some == status_code)
            .unwrap_or_default()
    }
}

impl HttpStatusCode for Error {
    fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Request { status, .. } => StatusCode::from_u16(*status).ok(),
            Error::AdminSecret { source, .. }
            | Error::LoginRejected { source, .. }
            | Error::Authentication { source } => source.status_code(),
            _ => None,
        }
    }
}

impl<T, E> HttpStatusCode for std::result::Result<T, E>
where
    E: HttpStatusCode,
{
    fn status_code(&self) -> Option<StatusCode> {
        self.as_ref().err().and_then(|e| e.status_code())
    }
}
