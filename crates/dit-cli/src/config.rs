//! Project settings: `<root>/.dit/config.toml`, overridden by flags and
//! environment variables.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use dit_protocol::DEFAULT_TAG;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Contents of the project config file. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub host: Option<String>,
    pub tag: Option<String>,
    pub token: Option<String>,
}

impl ProjectConfig {
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(CONFIG_FILE_NAME)
    }

    /// Load the config file, or defaults when it does not exist.
    pub fn load(state_dir: &Path) -> anyhow::Result<Self> {
        let path = Self::path_in(state_dir);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Layer command-line values over file values.
    pub fn resolve(
        self,
        host: Option<String>,
        tag: Option<String>,
        token: Option<String>,
    ) -> anyhow::Result<DeploySettings> {
        let Some(host) = non_blank(host).or_else(|| non_blank(self.host)) else {
            bail!("no deploy host configured: pass --host, set DIT_HOST, or add `host` to .dit/config.toml");
        };
        Ok(DeploySettings {
            host,
            tag: non_blank(tag)
                .or_else(|| non_blank(self.tag))
                .unwrap_or_else(|| DEFAULT_TAG.to_string()),
            token: non_blank(token).or_else(|| non_blank(self.token)),
        })
    }
}

/// Fully resolved settings for one deploy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploySettings {
    pub host: String,
    pub tag: String,
    pub token: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
