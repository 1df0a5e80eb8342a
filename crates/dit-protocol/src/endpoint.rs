/// HTTP endpoint paths of the deploy service.
pub mod endpoints {
    pub const DEPLOY: &str = "/app/deploy";
    pub const HEALTH: &str = "/health";
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Body of a successful deploy.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeployResponse {
    pub name: String,
    pub tag: String,
    /// Relative paths written from the archive.
    pub extracted: Vec<String>,
    /// Relative paths removed from the app directory.
    pub deleted: Vec<String>,
}
