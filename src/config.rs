use crate::data::Record;
use crate::detect::IDENTITY_CANDIDATES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Connection descriptor of a backing store. Only carried through; the
/// engine never opens connections itself.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDescriptor")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A named collection/table and the fields it is known to carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// field name → declared type
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_data: Vec<Record>,
}

impl CollectionSpec {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

/// Process-wide settings blob. Loaded once by the embedding process and
/// shared read-only (typically behind an `Arc`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub store: StoreDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<StoreDescriptor>,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSpec>,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid config JSON")
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.get(name)
    }

    /// Names of collections declaring `field`, sorted by name.
    pub fn collections_with_field(&self, field: &str) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|(_, spec)| spec.has_field(field))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// First identity candidate declared by `collection`.
    pub fn identity_field_of(&self, collection: &str) -> Option<&'static str> {
        let spec = self.collection(collection)?;
        IDENTITY_CANDIDATES
            .iter()
            .copied()
            .find(|candidate| spec.has_field(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "host": "localhost",
        "port": 27017,
        "database": "school",
        "username": "admin",
        "password": "hunter2",
        "collections": {
            "students": {"fields": {"姓名": "string", "学号": "string", "班级": "string"}},
            "attendance": {"fields": {"学号": "string", "状态": "string"}},
            "classes": {"fields": {"班级": "string"}}
        }
    }"#;

    #[test]
    fn test_parse_config() {
        let config = EngineConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.store.port, Some(27017));
        assert_eq!(config.collections.len(), 3);
        assert_eq!(config.collections_with_field("班级"), vec!["classes", "students"]);
        assert_eq!(config.identity_field_of("students"), Some("姓名"));
        assert_eq!(config.identity_field_of("attendance"), None);
        assert_eq!(config.identity_field_of("missing"), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = EngineConfig::from_json_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.store.database.as_deref(), Some("school"));

        assert!(EngineConfig::load("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_empty_and_nested_mysql() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert!(config.collections.is_empty());

        let config =
            EngineConfig::from_json_str(r#"{"mysql": {"host": "db", "port": 3306}}"#).unwrap();
        assert_eq!(config.mysql.unwrap().port, Some(3306));
    }
}
