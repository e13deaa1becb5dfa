//! Generator configuration (sharpen.toml format).

use crate::error::{BuildError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options steering how a translation unit is rendered as C#.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GeneratorConfig {
    /// Namespace every emitted declaration lives in.
    pub namespace: String,

    /// Library name written into `[DllImport]`.
    pub library: String,

    /// Static class receiving free functions, globals and anonymous enum
    /// constants.
    pub methods_class: String,

    /// Text emitted verbatim at the top of every file.
    pub header: Option<String>,

    /// Native declaration names that are not emitted.
    pub exclude: Vec<String>,

    /// Native name -> managed name.
    pub remap: IndexMap<String, String>,

    /// Native function name -> exported symbol to import.
    pub entry_points: IndexMap<String, String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            namespace: "Sharpen.Interop".to_string(),
            library: "native".to_string(),
            methods_class: "Methods".to_string(),
            header: None,
            exclude: Vec::new(),
            remap: IndexMap::new(),
            entry_points: IndexMap::new(),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GeneratorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }

    /// Reject names that cannot appear in C# source.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || !self.namespace.split('.').all(is_identifier) {
            return Err(BuildError::Validation(format!(
                "namespace `{}` is not a dotted C# identifier",
                self.namespace
            )));
        }
        if !is_identifier(&self.methods_class) {
            return Err(BuildError::Validation(format!(
                "methods-class `{}` is not a C# identifier",
                self.methods_class
            )));
        }
        if self.library.is_empty() {
            return Err(BuildError::Validation("library must not be empty".to_string()));
        }
        for (native, managed) in &self.remap {
            if !is_identifier(managed) {
                return Err(BuildError::Validation(format!(
                    "remap target `{managed}` for `{native}` is not a C# identifier"
                )));
            }
        }
        Ok(())
    }

    pub fn is_excluded(&self, native_name: &str) -> bool {
        self.exclude.iter().any(|name| name == native_name)
    }

    /// Managed name for a native declaration name.
    pub fn remapped<'a>(&'a self, native_name: &'a str) -> &'a str {
        self.remap
            .get(native_name)
            .map(String::as_str)
            .unwrap_or(native_name)
    }

    pub fn entry_point(&self, native_name: &str) -> Option<&str> {
        self.entry_points.get(native_name).map(String::as_str)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
namespace = "MyLib.Interop"
library = "mylib"
methods-class = "Native"
header = "// generated"
exclude = ["internal_helper"]

[remap]
OldName = "NewName"

[entry-points]
my_function = "my_function_v2"
        "#;

        let config: GeneratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.namespace, "MyLib.Interop");
        assert_eq!(config.methods_class, "Native");
        assert_eq!(config.header.as_deref(), Some("// generated"));
        assert!(config.is_excluded("internal_helper"));
        assert_eq!(config.remapped("OldName"), "NewName");
        assert_eq!(config.remapped("Other"), "Other");
        assert_eq!(config.entry_point("my_function"), Some("my_function_v2"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_empty() {
        let config: GeneratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.methods_class, "Methods");
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_namespace() {
        let config = GeneratorConfig::default().with_namespace("My..Lib");
        assert!(matches!(config.validate(), Err(BuildError::Validation(_))));

        let config = GeneratorConfig::default().with_namespace("1Lib");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharpen.toml");
        std::fs::write(&path, "namespace = \"A.B\"\nlibrary = \"lib\"\n").unwrap();
        let config = GeneratorConfig::from_file(&path).unwrap();
        assert_eq!(config.namespace, "A.B");
        assert_eq!(config.library, "lib");

        std::fs::write(&path, "namespace = \"\"\n").unwrap();
        assert!(GeneratorConfig::from_file(&path).is_err());
    }
}
