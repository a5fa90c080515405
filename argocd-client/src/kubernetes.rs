use crate::error::{self, Error, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::config::{AuthInfo, KubeConfigOptions};
use kube::{Api, Config};
use log::debug;
use secrecy::SecretString;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fs;

/// The fields of a Kubernetes secret, each value in its base64-encoded wire form.
pub type SecretData = BTreeMap<String, SecretString>;

/// `AmbientTokenProvider` exposes the bearer token of the Kubernetes identity the process is
/// already running as.
///
/// This is provided as a trait so that tests can substitute a fake identity. In practice you will
/// use [`KubeCluster`].
pub trait AmbientTokenProvider {
    /// The raw `authorization` api-key value of the loaded client configuration, if any. The
    /// value may still carry a `Bearer ` prefix.
    fn ambient_token(&self) -> Result<Option<SecretString>>;
}

/// `SecretReader` reads Kubernetes secrets.
///
/// This is provided as a trait so that tests can substitute fake secrets. In practice you will
/// use [`KubeCluster`].
pub trait SecretReader {
    fn read_secret(&self, namespace: &str, name: &str) -> Result<SecretData>;
}

/// The Kubernetes cluster described by the local kubeconfig, or by the in-cluster service account
/// when no kubeconfig is available.
///
/// `kube` is asynchronous, so a `KubeCluster` owns a single-threaded `tokio` runtime that its
/// calls block on. It must not be used from within another async runtime.
pub struct KubeCluster {
    runtime: tokio::runtime::Runtime,
    config: Config,
    client: kube::Client,
}

impl KubeCluster {
    /// Load the Kubernetes client configuration for `context`, or for the current context when
    /// `None`.
    pub fn load(context: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context(error::RuntimeSnafu)?;
        let config = runtime.block_on(load_config(context))?;
        let client = {
            let _guard = runtime.enter();
            kube::Client::try_from(config.clone()).context(error::KubeClientSnafu)?
        };
        debug!(
            "Loaded Kubernetes configuration for cluster '{}'",
            config.cluster_url
        );
        Ok(Self {
            runtime,
            config,
            client,
        })
    }
}

async fn load_config(context: Option<&str>) -> Result<Config> {
    match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .map_err(|e| Error::KubeConfig {
                    context: Some(context.to_string()),
                    source: Box::new(e),
                })
        }
        None => Config::infer().await.map_err(|e| Error::KubeConfig {
            context: None,
            source: Box::new(e),
        }),
    }
}

/// Only static credentials are used: a `token` or `tokenFile` in the kubeconfig user, or the
/// in-cluster service account token. Users authenticated through an `exec` plugin or an
/// `auth-provider` (as on EKS, GKE and AKS) have no ambient token.
impl AmbientTokenProvider for KubeCluster {
    fn ambient_token(&self) -> Result<Option<SecretString>> {
        static_token(&self.config.auth_info)
    }
}

fn static_token(auth_info: &AuthInfo) -> Result<Option<SecretString>> {
    if let Some(token) = &auth_info.token {
        return Ok(Some(token.clone()));
    }
    if let Some(path) = &auth_info.token_file {
        return fs::read_to_string(path)
            .map(|token| Some(SecretString::new(token)))
            .context(error::TokenFileSnafu { path });
    }
    if auth_info.exec.is_some() || auth_info.auth_provider.is_some() {
        debug!(
            "The Kubernetes user authenticates with an exec plugin or auth provider, \
             which is not used as an ambient token"
        );
    }
    Ok(None)
}

impl SecretReader for KubeCluster {
    fn read_secret(&self, namespace: &str, name: &str) -> Result<SecretData> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = self
            .runtime
            .block_on(secrets.get(name))
            .map_err(|e| Error::Kubernetes {
                operation: format!("get secret '{}' in namespace '{}'", name, namespace),
                source: Box::new(e),
            })?;
        secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(field, value)| {
                encode_field(name, &field, &value).map(|encoded| (field, encoded))
            })
            .collect()
    }
}

/// `k8s-openapi` decodes secret data as it is read. Serializing a `ByteString` gives back the
/// base64 text that the API server sent.
fn encode_field(name: &str, field: &str, value: &ByteString) -> Result<SecretString> {
    let encoded = serde_json::to_string(value).context(error::SecretEncodeSnafu { name, field })?;
    Ok(SecretString::new(encoded.trim_matches('"').to_string()))
}
