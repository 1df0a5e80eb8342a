//! Deploy receiver for dit.
//!
//! Accepts `POST /app/deploy` uploads produced by the dit client and applies
//! them to `<apps_root>/<name>`: deleted paths are removed, the delta archive
//! is unpacked over the existing tree, and the tag is recorded.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AllowAllAuth, AuthProvider, Credentials, Identity, StaticTokenAuth};
pub use config::{ServerConfig, DEFAULT_MAX_UPLOAD_SIZE};
pub use error::{ServerError, ServerResult};
pub use handler::{apply_deploy, TAG_FILE_NAME};
pub use router::{build_router, AppState};
pub use server::DitServer;
