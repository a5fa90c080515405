/// Helper macro to avoid retyping the ArgoCD API prefix when creating endpoint paths. When given
/// no parameters this returns the prefix itself, when given a string literal it appends
/// `/parameter` to it.
macro_rules! argocd_api {
    () => {
        "/api/v1"
    };
    ($s:literal) => {
        concat!(argocd_api!(), "/", $s)
    };
}

// Defaults
pub const DEFAULT_NAMESPACE: &str = "argocd";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_SERVICE: &str = "argocd-server";

// Bootstrap credentials provisioned by an ArgoCD install
pub const ADMIN_SECRET_NAME: &str = "argocd-initial-admin-secret";
pub const ADMIN_SECRET_PASSWORD_FIELD: &str = "password";
pub const ADMIN_USERNAME: &str = "admin";

// Ambient Kubernetes credentials
pub const BEARER_PREFIX: &str = "Bearer ";

// ArgoCD REST endpoints
pub const API_SESSION: &str = argocd_api!("session");
pub const API_APPLICATIONS: &str = argocd_api!("applications");
pub const API_CLUSTERS: &str = argocd_api!("clusters");
pub const API_PROJECTS: &str = argocd_api!("projects");

// Application actions, appended to `API_APPLICATIONS/<name>`
pub const ACTION_REFRESH: &str = "refresh";
pub const ACTION_SYNC: &str = "sync";

// Environment variables, see `ClientConfig::from_env`
pub const ENV_PREFIX: &str = "ARGOCD_";
pub const ENV_SERVER: &str = "ARGOCD_SERVER";
pub const ENV_NAMESPACE: &str = "ARGOCD_NAMESPACE";
pub const ENV_USERNAME: &str = "ARGOCD_USERNAME";
pub const ENV_PASSWORD: &str = "ARGOCD_PASSWORD";
pub const ENV_KUBE_CONTEXT: &str = "ARGOCD_KUBE_CONTEXT";
pub const ENV_INSECURE: &str = "ARGOCD_INSECURE";
pub const ENV_TIMEOUT_SECS: &str = "ARGOCD_TIMEOUT_SECS";

#[test]
fn argocd_api_macro_test() {
    assert_eq!("/api/v1", argocd_api!());
    assert_eq!("/api/v1/session", API_SESSION);
    assert_eq!("/api/v1/foo", argocd_api!("foo"));
}
