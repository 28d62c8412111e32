//! Opening a source location in the developer's editor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::fiber::SourceLocation;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::editor");

const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(2);

fn default_endpoint_base() -> String {
    "http://localhost:5173".to_owned()
}

fn default_endpoint_path() -> String {
    "__open-in-editor".to_owned()
}

fn default_editor_scheme() -> String {
    "vscode".to_owned()
}

/// How to reach the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Base URL of the dev server exposing the open-in-editor endpoint.
    pub endpoint_base: String,
    /// Path of the open-in-editor endpoint under the base.
    pub endpoint_path: String,
    /// URL scheme used for the direct-launch fallback.
    pub editor_scheme: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            endpoint_base: default_endpoint_base(),
            endpoint_path: default_endpoint_path(),
            editor_scheme: default_editor_scheme(),
        }
    }
}

/// Failure of a single open strategy.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The dev-server endpoint refused the request.
    #[error("editor endpoint returned {status}: {message}")]
    Endpoint {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The request never reached the endpoint.
    #[error("editor endpoint unreachable: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// A strategy could not assemble a valid target URL.
    #[error("invalid editor url: {message}")]
    InvalidUrl {
        /// Description of the URL failure.
        message: String,
    },

    /// The embedder-supplied launcher refused the URL.
    #[error("editor launcher failed: {message}")]
    Launcher {
        /// Description of the launcher failure.
        message: String,
    },
}

/// One way of getting a source location in front of the developer.
pub trait OpenStrategy: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Attempts to open the location.
    ///
    /// # Errors
    ///
    /// Returns the reason this strategy could not open the location; the
    /// opener then moves on to the next strategy.
    fn attempt(&self, location: &SourceLocation) -> Result<(), OpenError>;
}

/// Tries each strategy once, in order, until one succeeds.
///
/// Opening the editor is best effort: the result is a plain success flag and
/// individual failures are logged, never surfaced as errors. No strategy is
/// ever retried within one `open` call.
pub struct EditorOpener {
    strategies: Vec<Box<dyn OpenStrategy>>,
}

impl std::fmt::Debug for EditorOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorOpener")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

impl EditorOpener {
    /// Creates an opener over an explicit strategy order.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn OpenStrategy>>) -> Self {
        Self { strategies }
    }

    /// Creates the standard opener: dev-server endpoint first, direct URL
    /// scheme launch as the fallback.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn standard(config: &EditorConfig, launcher: LauncherFn) -> Result<Self, OpenError> {
        Ok(Self::new(vec![
            Box::new(EndpointStrategy::new(config)?),
            Box::new(UrlSchemeStrategy::new(&config.editor_scheme, launcher)),
        ]))
    }

    /// Attempts to open the location, returning whether any strategy
    /// succeeded.
    pub fn open(&self, location: &SourceLocation) -> bool {
        for strategy in &self.strategies {
            match strategy.attempt(location) {
                Ok(()) => {
                    tracing::info!(
                        target: TARGET,
                        strategy = strategy.name(),
                        %location,
                        "opened in editor"
                    );
                    return true;
                }
                Err(error) => {
                    tracing::warn!(
                        target: TARGET,
                        strategy = strategy.name(),
                        %error,
                        "open strategy failed"
                    );
                }
            }
        }
        tracing::warn!(target: TARGET, %location, "no strategy could open the editor");
        false
    }
}

/// Asks the dev server to open the file via its open-in-editor endpoint.
///
/// The endpoint runs next to the developer's editor process, so it can
/// honour whatever editor the project is configured for.
#[derive(Debug)]
pub struct EndpointStrategy {
    client: reqwest::blocking::Client,
    base: String,
    path: String,
}

impl EndpointStrategy {
    /// Creates the strategy from an editor configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &EditorConfig) -> Result<Self, OpenError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(ENDPOINT_TIMEOUT)
            .build()
            .map_err(|error| OpenError::Transport {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            base: config.endpoint_base.clone(),
            path: config.endpoint_path.clone(),
        })
    }

    /// Assembles the request URL for a location.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::InvalidUrl`] when the configured base or path
    /// does not parse.
    pub fn request_url(&self, location: &SourceLocation) -> Result<Url, OpenError> {
        let invalid = |error: url::ParseError| OpenError::InvalidUrl {
            message: error.to_string(),
        };
        let base = Url::parse(&self.base).map_err(invalid)?;
        let mut url = base.join(&self.path).map_err(invalid)?;
        url.query_pairs_mut()
            .append_pair("file", &location.to_string());
        Ok(url)
    }
}

impl OpenStrategy for EndpointStrategy {
    fn name(&self) -> &str {
        "endpoint"
    }

    fn attempt(&self, location: &SourceLocation) -> Result<(), OpenError> {
        let url = self.request_url(location)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|error| OpenError::Transport {
                message: error.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(OpenError::Endpoint {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_owned(),
            })
        }
    }
}

/// Launches a navigation to an editor URL scheme.
pub type LauncherFn = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Opens the file through the editor's own URL scheme, e.g.
/// `vscode://file/src/app.tsx:10:4`.
///
/// Used as the fallback when no dev-server endpoint is reachable. The
/// embedder supplies the launcher that performs the actual navigation.
pub struct UrlSchemeStrategy {
    scheme: String,
    launcher: LauncherFn,
}

impl std::fmt::Debug for UrlSchemeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSchemeStrategy")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl UrlSchemeStrategy {
    /// Creates the strategy for an editor scheme and launcher.
    pub fn new(scheme: impl Into<String>, launcher: LauncherFn) -> Self {
        Self {
            scheme: scheme.into(),
            launcher,
        }
    }

    /// The URL this strategy would launch for a location.
    #[must_use]
    pub fn launch_url(&self, location: &SourceLocation) -> String {
        format!(
            "{}://file/{}:{}:{}",
            self.scheme, location.file_name, location.line_number, location.column_number
        )
    }
}

impl OpenStrategy for UrlSchemeStrategy {
    fn name(&self) -> &str {
        "url-scheme"
    }

    fn attempt(&self, location: &SourceLocation) -> Result<(), OpenError> {
        let url = self.launch_url(location);
        (self.launcher)(&url).map_err(|message| OpenError::Launcher { message })
    }
}
