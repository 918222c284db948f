//! Configuration records delivered by the configuration source.
//!
//! A record arrives as a flat string property map keyed by a transient
//! [`ConfigId`]. [`ConfigRecord::parse`] turns it into an immutable snapshot,
//! inferring `name` and `type` from `location` when they are absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw properties as delivered by the configuration source.
pub type ConfigProperties = BTreeMap<String, String>;

/// Builds a [`ConfigProperties`] map from key/value pairs.
pub fn properties<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> ConfigProperties
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Transient identifier of one configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId(String);

impl ConfigId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConfigId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConfigId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A record that cannot identify a workload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration {config_id} is missing {}", missing.join(", "))]
pub struct InvalidConfig {
    pub config_id: ConfigId,
    pub missing: Vec<&'static str>,
}

/// Immutable snapshot of one configuration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub config_id: ConfigId,
    pub location: String,
    pub app_type: String,
    pub name: String,
    pub auto_start: bool,
    pub start_after: Vec<ConfigId>,
    pub properties: ConfigProperties,
}

impl ConfigRecord {
    pub const LOCATION: &'static str = "location";
    pub const TYPE: &'static str = "type";
    pub const NAME: &'static str = "name";
    pub const AUTO_START: &'static str = "autoStart";
    pub const START_AFTER: &'static str = "startAfter";

    /// Parses a property map, inferring `name` and `type` from `location`.
    pub fn parse(config_id: ConfigId, properties: ConfigProperties) -> Result<Self, InvalidConfig> {
        let location = non_empty(&properties, Self::LOCATION);
        let file_name = location.as_deref().and_then(last_segment);

        let name = non_empty(&properties, Self::NAME)
            .or_else(|| file_name.map(|f| strip_extension(f).to_string()))
            .filter(|n| !n.is_empty());
        let app_type = non_empty(&properties, Self::TYPE)
            .or_else(|| file_name.and_then(extension).map(str::to_string));

        let mut missing = Vec::new();
        if location.is_none() {
            missing.push(Self::LOCATION);
        }
        if app_type.is_none() {
            missing.push(Self::TYPE);
        }
        if name.is_none() {
            missing.push(Self::NAME);
        }
        let (Some(location), Some(app_type), Some(name)) = (location, app_type, name) else {
            return Err(InvalidConfig { config_id, missing });
        };

        let auto_start = properties
            .get(Self::AUTO_START)
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let start_after = properties
            .get(Self::START_AFTER)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ConfigId::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config_id,
            location,
            app_type,
            name,
            auto_start,
            start_after,
            properties,
        })
    }

    /// Short label used in signal descriptions.
    pub fn label(&self) -> String {
        format!("{} application {}", self.app_type, self.name)
    }
}

fn non_empty(properties: &ConfigProperties, key: &str) -> Option<String> {
    properties
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn last_segment(location: &str) -> Option<&str> {
    location
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    }
}

fn extension(file_name: &str) -> Option<&str> {
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(&file_name[dot + 1..]).filter(|e| !e.is_empty()),
    }
}
