//! Generator configuration for sharpen.
//!
//! # Example
//!
//! ```toml
//! # sharpen.toml
//! namespace = "MyLib.Interop"
//! library = "mylib"
//! methods-class = "Native"
//! exclude = ["internal_helper"]
//!
//! [remap]
//! MyOldName = "MyNewName"
//!
//! [entry-points]
//! my_function = "my_function_v2"
//! ```

mod config;
mod error;

pub use config::GeneratorConfig;
pub use error::{BuildError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_config() {
        let toml = r#"
namespace = "ClangSharp.Test"
library = "ClangSharpPInvokeGenerator"
        "#;

        let config: GeneratorConfig = toml::from_str(toml).expect("Failed to parse config");
        assert_eq!(config.namespace, "ClangSharp.Test");
        assert_eq!(config.methods_class, "Methods");
        assert!(config.validate().is_ok());
    }
}
