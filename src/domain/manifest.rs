//! Service manifest (`service-config.json`) schema and loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::route_table::normalize_route;
use crate::auth::AuthConfig;
use crate::error::ManifestError;

/// A volume declared by a service.
///
/// Recorded and logged only; mounting is left to the deployment
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeSpec {
    /// Host path.
    pub source: String,
    /// Path inside the service's view of the filesystem.
    pub target: String,
    /// Whether the mount is read-only.
    #[serde(default, alias = "readOnly")]
    pub read_only: bool,
}

/// Immutable, parsed form of one service manifest.
///
/// Produced once per service directory during discovery and never
/// re-read afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Unique service name; the registry key.
    pub name: String,

    /// Implementation language. Informational only.
    #[serde(default)]
    pub language: String,

    /// Canonical service directory. Filled in by [`ServiceConfig::parse`].
    #[serde(skip)]
    pub base_path: PathBuf,

    /// Shell command for the long-running process.
    #[serde(default, alias = "startCommand")]
    pub start_command: Option<String>,

    /// Requested public route prefix, normalised.
    #[serde(default)]
    pub route: Option<String>,

    /// Setup script path relative to the service directory.
    #[serde(default)]
    pub setup: Option<String>,

    /// Upstream base URL requests are forwarded to.
    #[serde(default)]
    pub upstream: Option<String>,

    /// Variables merged over the inherited environment of child processes.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Declared volumes, in manifest order.
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    /// Authentication rules; `None` when the manifest has no `auth` block.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl ServiceConfig {
    /// Reads and parses `<dir>/<manifest_file>`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be read, is not valid
    /// JSON for the manifest schema, or violates a field constraint.
    pub async fn load(dir: &Path, manifest_file: &str) -> Result<Self, ManifestError> {
        let path = dir.join(manifest_file);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ManifestError::Read {
                path: path.clone(),
                source,
            })?;
        let base_path = tokio::fs::canonicalize(dir)
            .await
            .map_err(|source| ManifestError::Read {
                path: dir.to_path_buf(),
                source,
            })?;
        Self::parse(&raw, base_path, &path)
    }

    /// Parses manifest text for a service rooted at `base_path`.
    ///
    /// `manifest_path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed JSON and
    /// [`ManifestError::Invalid`] for an empty name or a non-HTTP upstream.
    pub fn parse(raw: &str, base_path: PathBuf, manifest_path: &Path) -> Result<Self, ManifestError> {
        let mut config: Self = serde_json::from_str(raw).map_err(|source| ManifestError::Parse {
            path: manifest_path.to_path_buf(),
            source,
        })?;

        let invalid = |reason: &str| ManifestError::Invalid {
            path: manifest_path.to_path_buf(),
            reason: reason.to_string(),
        };

        config.name = config.name.trim().to_string();
        if config.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if let Some(upstream) = &config.upstream
            && !(upstream.starts_with("http://") || upstream.starts_with("https://"))
        {
            return Err(invalid("upstream must be an http:// or https:// URL"));
        }

        config.route = config.route.as_deref().and_then(normalize_route);
        config.base_path = base_path;
        Ok(config)
    }

    /// The start command, if one is declared and non-blank.
    #[must_use]
    pub fn start_command(&self) -> Option<&str> {
        self.start_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

/// Guesses a start command from the entry-point files present in `dir`.
///
/// Checked in a fixed order; the first match wins.
#[must_use]
pub fn infer_start_command(dir: &Path) -> Option<&'static str> {
    const ENTRY_POINTS: &[(&str, &str)] = &[
        ("app.py", "python app.py"),
        ("main.js", "node main.js"),
        ("main.go", "go run main.go"),
        ("Cargo.toml", "cargo run"),
        ("Main.java", "javac Main.java && java Main"),
        ("index.rb", "ruby index.rb"),
    ];
    ENTRY_POINTS
        .iter()
        .find(|(file, _)| dir.join(file).is_file())
        .map(|(_, command)| *command)
}
