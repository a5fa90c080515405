#![allow(dead_code)]

//! Mock collaborators so that the login chain and the API operations can be tested without
//! Kubernetes or an ArgoCD server.

use argocd_client::{
    AmbientTokenProvider, Error, HttpRequest, HttpResponse, Method, Result, SecretData,
    SecretReader, Transport,
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use secrecy::SecretString;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

pub const HOST: &str = "https://example.com";
pub const SESSION_URL: &str = "https://example.com/api/v1/session";

/// A [`Transport`] that records every request and answers from a queue. Clones share the same
/// queue and record, so a test can keep one clone after handing another to the client.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    insecure: bool,
}

#[derive(Default)]
struct Inner {
    responses: VecDeque<Result<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that does not verify TLS certificates.
    pub fn insecure() -> Self {
        Self {
            insecure: true,
            ..Default::default()
        }
    }

    /// Queue a response with `status` and a JSON `body`.
    pub fn respond(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(Ok(HttpResponse::new(status, body.to_string())))
    }

    /// Queue a successful login returning `token`.
    pub fn accept_login(&self, token: &str) -> &Self {
        self.respond(200, serde_json::json!({ "token": token }))
    }

    /// Queue a connection-level failure.
    pub fn fail(&self) -> &Self {
        self.push(Err(Error::Transport {
            method: Method::Post,
            url: SESSION_URL.to_string(),
            source: "connection refused".into(),
        }))
    }

    fn push(&self, response: Result<HttpResponse>) -> &Self {
        self.inner.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// The parsed JSON bodies of every request sent to the session endpoint.
    pub fn logins(&self) -> Vec<serde_json::Value> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == Method::Post && request.url == SESSION_URL)
            .map(|request| body_json(&request))
            .collect()
    }

    /// Requests sent after the client was constructed.
    pub fn api_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url != SESSION_URL)
            .collect()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request);
        inner
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, "{}")))
    }

    fn verifies_tls(&self) -> bool {
        !self.insecure
    }
}

pub fn body_json(request: &HttpRequest) -> serde_json::Value {
    serde_json::from_str(request.body.as_deref().unwrap_or("null")).unwrap()
}

/// An [`AmbientTokenProvider`] with a fixed answer that counts how often it is asked.
#[derive(Default)]
pub struct FakeAmbient {
    token: Option<String>,
    broken: bool,
    calls: AtomicUsize,
}

impl FakeAmbient {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AmbientTokenProvider for FakeAmbient {
    fn ambient_token(&self) -> Result<Option<SecretString>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(Error::Kubernetes {
                operation: "read the ambient token".to_string(),
                source: "no such file".into(),
            });
        }
        Ok(self.token.clone().map(SecretString::new))
    }
}

/// A [`SecretReader`] holding at most one secret, which records every read.
#[derive(Default)]
pub struct FakeSecrets {
    data: Option<BTreeMap<String, String>>,
    reads: Mutex<Vec<(String, String)>>,
}

impl FakeSecrets {
    /// A cluster whose initial admin secret holds the base64-encoded `password`.
    pub fn admin_password(encoded: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("password".to_string(), encoded.to_string());
        Self::with_data(data)
    }

    pub fn with_data(data: BTreeMap<String, String>) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// A cluster where reading the secret fails, e.g. because it was deleted after install.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> Vec<(String, String)> {
        self.reads.lock().unwrap().clone()
    }
}

impl SecretReader for FakeSecrets {
    fn read_secret(&self, namespace: &str, name: &str) -> Result<SecretData> {
        self.reads
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string()));
        match &self.data {
            Some(data) => Ok(data
                .iter()
                .map(|(key, value)| (key.clone(), SecretString::new(value.clone())))
                .collect()),
            None => Err(Error::Kubernetes {
                operation: format!("get secret '{}' in namespace '{}'", name, namespace),
                source: "secrets \"argocd-initial-admin-secret\" not found".into(),
            }),
        }
    }
}

thread_local! {
    static WARNINGS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Passes records on to `env_logger` and keeps the warnings logged on each test thread.
struct CapturingLogger {
    inner: env_logger::Logger,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn || self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Warn {
            WARNINGS.with(|warnings| warnings.borrow_mut().push(record.args().to_string()));
        }
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let inner = env_logger::Builder::from_default_env()
            .is_test(true)
            .build();
        let max_level = inner.filter().max(LevelFilter::Warn);
        log::set_boxed_logger(Box::new(CapturingLogger { inner })).unwrap();
        log::set_max_level(max_level);
    });
}

/// The warnings logged on this thread since the last call.
pub fn take_warnings() -> Vec<String> {
    WARNINGS.with(|warnings| std::mem::take(&mut *warnings.borrow_mut()))
}
