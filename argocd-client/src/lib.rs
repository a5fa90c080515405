/*!

This library authenticates to an ArgoCD server and exposes a small set of its REST operations:
listing applications, clusters and projects, and requesting a refresh or sync of an application.

Authentication walks a fixed chain of credential sources: explicit username and password, the
ambient Kubernetes identity token, and finally the `argocd-initial-admin-secret` that ArgoCD
provisions at install time. See [`ArgoCdClient`] for the details.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use auth::CredentialSource;
pub use client::{Application, ArgoCdClient, Cluster, Project, Session};
pub use config::{ClientConfig, ClientConfigBuilder, ExplicitLoginFailure};
pub use error::{Error, ErrorKind, HttpStatusCode, Result, StatusCode};
pub use kubernetes::{AmbientTokenProvider, KubeCluster, SecretData, SecretReader};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

mod auth;
mod client;
mod config;
pub mod constants;
mod error;
mod kubernetes;
mod transport;
