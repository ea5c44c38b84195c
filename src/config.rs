//! Configuration for the CRUD layer.
//!
//! A [`CrudConfig`] is an immutable snapshot: the compiled schema registry plus the
//! [`CrudOptions`] that tune the policy gate. Reconfiguring replaces the whole snapshot.
//! [`ConfigFile`] is the on-disk form, accepted as JSON or YAML:
//!
//! ```yaml
//! strict: false
//! use_defaults: true
//! schema:
//!   users: { type: object, required: [email] }
//!   notes: null
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::{SchemaMap, SchemaRegistry};
use crate::validate::SchemaError;

/// Options that tune the policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudOptions {
    /// Reject undeclared collections even when the schema map is empty.
    pub strict: bool,
    /// Fill schema `default` values into created documents before validation.
    pub use_defaults: bool,
}

impl Default for CrudOptions {
    fn default() -> Self {
        Self {
            strict: false,
            use_defaults: true,
        }
    }
}

/// A compiled, immutable configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct CrudConfig {
    /// Compiled schemas per declared collection.
    pub registry: SchemaRegistry,
    /// Gate options.
    pub options: CrudOptions,
}

impl CrudConfig {
    /// Compiles a schema map into a configuration.
    pub fn new(schema: &SchemaMap, options: CrudOptions) -> Result<Self, SchemaError> {
        Ok(Self {
            registry: SchemaRegistry::register(schema)?,
            options,
        })
    }

    /// A configuration with no declared collections.
    pub fn empty(options: CrudOptions) -> Self {
        Self {
            registry: SchemaRegistry::empty(),
            options,
        }
    }
}

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file has a `.json` extension but is not valid configuration JSON.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    /// The file has a `.yaml` or `.yml` extension but is not valid configuration YAML.
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yml::Error),
    /// The file has no recognized extension and parses as neither JSON nor YAML.
    #[error("failed to parse config file; ensure it is valid JSON or YAML")]
    Unrecognized,
    /// A schema in the file does not compile.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Configuration file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// See [`CrudOptions::strict`].
    #[serde(default)]
    pub strict: bool,
    /// See [`CrudOptions::use_defaults`].
    #[serde(default = "default_use_defaults")]
    pub use_defaults: bool,
    /// Collection name to schema, `null` for collections without validation.
    #[serde(default)]
    pub schema: SchemaMap,
}

fn default_use_defaults() -> bool {
    true
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            strict: false,
            use_defaults: default_use_defaults(),
            schema: SchemaMap::new(),
        }
    }
}

impl ConfigFile {
    /// Reads and parses a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&path.to_string_lossy(), &content)
    }

    /// Parses configuration content, picking the format from the file name.
    ///
    /// `.json` is parsed as JSON and `.yaml`/`.yml` as YAML. Any other name tries JSON and
    /// then YAML.
    pub fn parse(file_name: &str, content: &str) -> Result<Self, ConfigError> {
        if file_name.ends_with(".json") {
            Ok(serde_json::from_str(content)?)
        } else if file_name.ends_with(".yaml") || file_name.ends_with(".yml") {
            Ok(serde_yml::from_str(content)?)
        } else if let Ok(config) = serde_json::from_str::<ConfigFile>(content) {
            Ok(config)
        } else if let Ok(config) = serde_yml::from_str::<ConfigFile>(content) {
            Ok(config)
        } else {
            Err(ConfigError::Unrecognized)
        }
    }

    /// The gate options declared by the file.
    pub fn options(&self) -> CrudOptions {
        CrudOptions {
            strict: self.strict,
            use_defaults: self.use_defaults,
        }
    }

    /// Compiles the file into a configuration snapshot.
    pub fn compile(&self) -> Result<CrudConfig, ConfigError> {
        Ok(CrudConfig::new(&self.schema, self.options())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
strict: true
schema:
  users:
    type: object
    required: [email]
  notes: null
"#;

    #[test]
    fn parse_yaml_by_extension() {
        let file = ConfigFile::parse("crud.yaml", YAML).unwrap();
        assert!(file.strict);
        assert!(file.use_defaults);
        assert_eq!(file.schema.get("notes"), Some(&None));
        assert_eq!(
            file.schema.get("users"),
            Some(&Some(json!({"type": "object", "required": ["email"]})))
        );
    }

    #[test]
    fn parse_json_by_extension() {
        let content = r#"{"use_defaults": false, "schema": {"notes": null}}"#;
        let file = ConfigFile::parse("crud.json", content).unwrap();
        assert!(!file.strict);
        assert!(!file.use_defaults);
        assert_eq!(file.schema.len(), 1);
    }

    #[test]
    fn unknown_extension_tries_both_formats() {
        assert!(ConfigFile::parse("crud.conf", r#"{"strict": true}"#).unwrap().strict);
        assert!(ConfigFile::parse("crud.conf", YAML).unwrap().strict);
        assert!(matches!(
            ConfigFile::parse("crud.conf", "strict: [unterminated"),
            Err(ConfigError::Unrecognized)
        ));
    }

    #[test]
    fn wrong_format_for_extension_is_an_error() {
        assert!(matches!(
            ConfigFile::parse("crud.json", YAML),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn compile_builds_registry() {
        let config = ConfigFile::parse("crud.yml", YAML)
            .unwrap()
            .compile()
            .unwrap();
        assert!(config.options.strict);
        assert!(config.registry.is_validating("users"));
        assert!(config.registry.has("notes"));
    }

    #[test]
    fn compile_reports_bad_schema() {
        let content = r#"{"schema": {"bad": {"type": 7}}}"#;
        let err = ConfigFile::parse("x.json", content)
            .unwrap()
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Schema(SchemaError::Collection { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ConfigFile::from_path(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn options_default() {
        let options = CrudOptions::default();
        assert!(!options.strict);
        assert!(options.use_defaults);
        assert_eq!(ConfigFile::default().options(), options);
    }
}
