//! Configuration Management
//!
//! This module holds the explicit configuration object handed to every
//! negotiation and diagnosis component, and the named cluster profiles
//! persisted alongside it.
//!
//! # Configuration Locations
//! - Local: `.cockroach-doctor/config.json` (team-shareable, per-project)
//! - Global: `~/.config/cockroach-doctor/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line parameters (highest priority)
//! 2. Local config file
//! 3. Global config file
//! 4. Built-in defaults
//!
//! Both files are partial: any key they omit falls through to the next layer.
//! Profiles from both files are visible; a local profile replaces a global
//! one with the same name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DoctorError, Result};

const APP_DIR: &str = "cockroach-doctor";

/// Settings shared by the connection builder, resolvers, and classifier chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctorConfig {
    /// Database the cluster hands out when none is chosen
    /// Connecting to it triggers the override prompt.
    pub reserved_database: String,

    /// Database suggested when the requested one does not exist
    pub fallback_database: String,

    /// Literal left in copy-pasted URLs instead of a password
    pub password_placeholder: String,

    /// Literal left in copy-pasted URLs instead of the certificate directory
    pub certs_dir_placeholder: String,

    /// Port used when the URL does not carry one
    pub default_port: u16,

    /// Value injected as `connect_timeout` when none is given on the command line
    pub timeout_seconds: u64,

    /// Where operators are told to send unexplained errors
    pub support_contact: String,

    /// HS256 signing secret for login tokens (at least 32 bytes)
    /// WARNING: Sensitive data, do not log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,

    /// Lifetime of issued login tokens
    pub token_lifetime_minutes: u64,

    /// Named cluster URLs
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, StoredProfile>,

    /// Profile used when none is named
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            reserved_database: "defaultdb".to_string(),
            fallback_database: "defaultdb".to_string(),
            password_placeholder: "<password>".to_string(),
            certs_dir_placeholder: "<certs_dir>".to_string(),
            default_port: 26257,
            timeout_seconds: 10,
            support_contact: "university@cockroachlabs.com".to_string(),
            token_secret: None,
            token_lifetime_minutes: 30,
            profiles: HashMap::new(),
            default_profile: None,
        }
    }
}

/// Stored cluster profile
///
/// The password may live in an environment variable instead of the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    /// Cluster URL as copied from the console
    pub url: String,

    /// Environment variable holding the password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredProfile {
    /// Resolve environment variables
    ///
    /// Returns the URL and the password override (if `password_env` is set).
    /// The URL is returned untouched so placeholders in it survive.
    pub fn resolve(&self) -> Result<(String, Option<String>)> {
        let password = match &self.password_env {
            Some(env_var) => match std::env::var(env_var) {
                Ok(password) => Some(password),
                Err(_) => {
                    return Err(DoctorError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            },
            None => None,
        };

        Ok((self.url.clone(), password))
    }
}

impl DoctorConfig {
    /// Look up a profile by name, or the default profile when `name` is None
    pub fn profile(&self, name: Option<&str>) -> Result<&StoredProfile> {
        let profile_name = match name {
            Some(n) => n,
            None => self.default_profile.as_deref().ok_or_else(|| {
                let available: Vec<_> = self.profiles.keys().collect();
                DoctorError::config_error(format!(
                    "No default profile set. Available profiles: {available:?}. \
                     Specify one with --profile."
                ))
            })?,
        };

        self.profiles.get(profile_name).ok_or_else(|| {
            let available: Vec<_> = self.profiles.keys().collect();
            DoctorError::config_error(format!(
                "Profile '{profile_name}' not found. Available profiles: {available:?}"
            ))
        })
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.cockroach-doctor/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/cockroach-doctor/config.json` (per-user)
    Global,
}

/// Get path to local config file
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        DoctorError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(format!(".{APP_DIR}")).join("config.json"))
}

/// Get path to global config file
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| DoctorError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join(APP_DIR).join("config.json"))
}

/// Read a config file as raw JSON
///
/// A missing file is an empty object.
pub fn load_layer(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| DoctorError::config_error(format!("Could not read config file: {e}")))?;

    let value: Value = serde_json::from_str(&contents).map_err(|e| {
        DoctorError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })?;

    if !value.is_object() {
        return Err(DoctorError::config_error(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }

    Ok(value)
}

/// Overlay `upper` onto `lower`, recursing into nested objects
fn merge_layers(lower: &mut Value, upper: Value) {
    match (lower, upper) {
        (Value::Object(lower_map), Value::Object(upper_map)) => {
            for (key, upper_value) in upper_map {
                match lower_map.get_mut(&key) {
                    Some(lower_value) => merge_layers(lower_value, upper_value),
                    None => {
                        lower_map.insert(key, upper_value);
                    }
                }
            }
        }
        (lower, upper) => *lower = upper,
    }
}

/// Build a config from layers, lowest priority first
pub fn from_layers(layers: impl IntoIterator<Item = Value>) -> Result<DoctorConfig> {
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        merge_layers(&mut merged, layer);
    }

    serde_json::from_value(merged)
        .map_err(|e| DoctorError::config_error(format!("Invalid configuration: {e}")))
}

/// Load configuration with precedence (local over global over defaults)
pub fn load_with_precedence() -> Result<DoctorConfig> {
    let global_path = global_config_path()?;
    let local_path = local_config_path()?;

    let config = from_layers([load_layer(&global_path)?, load_layer(&local_path)?])?;
    tracing::debug!(
        global = %global_path.display(),
        local = %local_path.display(),
        profiles = config.profiles.len(),
        "loaded configuration"
    );

    Ok(config)
}

/// Save a profile to a config file
///
/// Only the `profiles` and `default_profile` keys of the file are touched.
/// The first profile saved to a file becomes its default.
pub fn save_profile(
    name: &str,
    profile: StoredProfile,
    location: ConfigLocation,
) -> Result<PathBuf> {
    let path = match location {
        ConfigLocation::Local => local_config_path()?,
        ConfigLocation::Global => global_config_path()?,
    };

    save_profile_to(&path, name, profile)?;
    Ok(path)
}

/// Save a profile into the config file at `path`
pub fn save_profile_to(path: &Path, name: &str, profile: StoredProfile) -> Result<()> {
    let mut document = load_layer(path)?;
    let root = document
        .as_object_mut()
        .ok_or_else(|| DoctorError::config_error("Config root must be a JSON object"))?;

    let profiles = root
        .entry("profiles")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| DoctorError::config_error("'profiles' must be a JSON object"))?;

    let is_first_profile = profiles.is_empty();
    let serialized = serde_json::to_value(profile)
        .map_err(|e| DoctorError::config_error(format!("Could not serialize profile: {e}")))?;
    profiles.insert(name.to_string(), serialized);

    if is_first_profile && !root.contains_key("default_profile") {
        root.insert("default_profile".to_string(), Value::String(name.to_string()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DoctorError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(&document)
        .map_err(|e| DoctorError::config_error(format!("Could not serialize config: {e}")))?;
    fs::write(path, contents)
        .map_err(|e| DoctorError::config_error(format!("Could not write config file: {e}")))?;

    tracing::info!(profile = name, path = %path.display(), "saved profile");
    Ok(())
}

/// List profile names, sorted, with their URLs
#[must_use]
pub fn list_profiles(config: &DoctorConfig) -> Vec<(String, String)> {
    let mut profiles: Vec<_> =
        config.profiles.iter().map(|(name, p)| (name.clone(), p.url.clone())).collect();
    profiles.sort();
    profiles
}
