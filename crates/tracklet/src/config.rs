//! Configuration management for tracklet.
//!
//! Construction takes a [`PartialOptions`] (every field optional) and merges
//! it over the built-in defaults into an [`Options`]. The only required field
//! is `request_url`; its presence is checked once, here.
//!
//! Partial options can also be loaded with figment from a TOML file and
//! `TRACKLET_`-prefixed environment variables.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capture::CaptureCategory;
use crate::error::{Error, Result};

/// Version reported in every payload as `sdkVersion`.
pub const SDK_VERSION: &str = "1.0.0";

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "tracklet";

/// Environment variable prefix.
const ENV_PREFIX: &str = "TRACKLET_";

/// User-supplied configuration before merging.
///
/// Keys accept both `snake_case` and the wire `camelCase` spelling, so a
/// config file may say either `request_url` or `requestUrl`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialOptions {
    /// Collection endpoint.
    #[serde(alias = "requestUrl", skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    /// Report `pushState`, `replaceState` and `popstate`.
    #[serde(alias = "historyTracker", skip_serializing_if = "Option::is_none")]
    pub history_tracker: Option<bool>,
    /// Report `hashchange`.
    #[serde(alias = "hashTracker", skip_serializing_if = "Option::is_none")]
    pub hash_tracker: Option<bool>,
    /// Report pointer events on elements carrying the marker attribute.
    #[serde(alias = "domTracker", skip_serializing_if = "Option::is_none")]
    pub dom_tracker: Option<bool>,
    /// Report uncaught failures and unhandled rejections.
    #[serde(alias = "jsError", skip_serializing_if = "Option::is_none")]
    pub js_error: Option<bool>,
    /// User identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Passthrough context copied into every report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl PartialOptions {
    /// Create partial options with only the endpoint set.
    #[must_use]
    pub fn new(request_url: impl Into<String>) -> Self {
        Self {
            request_url: Some(request_url.into()),
            ..Self::default()
        }
    }

    /// Load partial options from the default config file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load partial options with an optional custom config path.
    ///
    /// Sources in order of precedence, highest first:
    /// 1. Environment variables (`TRACKLET_REQUEST_URL`, `TRACKLET_DOM_TRACKER`, ...)
    /// 2. TOML config file
    /// 3. Empty defaults
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        // File keys may be camelCase while env keys are always snake_case.
        // Settle the file layer on field names first so an env override
        // replaces the file value instead of colliding with its alias.
        let from_file: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_file))
            .extract()?;

        let figment = Figment::new()
            .merge(Serialized::defaults(from_file))
            .merge(Env::prefixed(ENV_PREFIX));

        Ok(figment.extract()?)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }
}

/// Merged configuration.
///
/// Serializes with the wire field names; absent `uuid` and `extra` are
/// omitted from the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// User identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Collection endpoint.
    pub request_url: String,
    /// Navigation capture flag.
    pub history_tracker: bool,
    /// Hash capture flag.
    pub hash_tracker: bool,
    /// Interaction capture flag.
    pub dom_tracker: bool,
    /// Failure capture flag.
    pub js_error: bool,
    /// Fixed SDK version.
    pub sdk_version: String,
    /// Passthrough context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl Options {
    /// Merge user values over the built-in defaults.
    ///
    /// `sdk_version` is always [`SDK_VERSION`]; it is not user-settable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequestUrl`] if `request_url` is absent or blank.
    pub fn merge(partial: PartialOptions) -> Result<Self> {
        let request_url = partial
            .request_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(Error::MissingRequestUrl)?;

        Ok(Self {
            uuid: partial.uuid,
            request_url,
            history_tracker: partial.history_tracker.unwrap_or(false),
            hash_tracker: partial.hash_tracker.unwrap_or(false),
            dom_tracker: partial.dom_tracker.unwrap_or(false),
            js_error: partial.js_error.unwrap_or(false),
            sdk_version: SDK_VERSION.to_string(),
            extra: partial.extra,
        })
    }

    /// Whether a capture category is switched on.
    #[must_use]
    pub fn is_enabled(&self, category: CaptureCategory) -> bool {
        match category {
            CaptureCategory::Navigation => self.history_tracker,
            CaptureCategory::Hash => self.hash_tracker,
            CaptureCategory::Interaction => self.dom_tracker,
            CaptureCategory::Failure => self.js_error,
        }
    }

    /// The enabled categories, in installation order.
    #[must_use]
    pub fn enabled_categories(&self) -> Vec<CaptureCategory> {
        CaptureCategory::ALL
            .into_iter()
            .filter(|category| self.is_enabled(*category))
            .collect()
    }
}
