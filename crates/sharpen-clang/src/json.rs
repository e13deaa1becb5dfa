//! JSON hand-off between an external front-end and the emitter.

use crate::ast::TranslationUnit;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum AstError {
    #[error("Failed to read AST file {path}: {source}")]
    #[diagnostic(code(sharpen::ast::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse AST JSON: {0}")]
    #[diagnostic(code(sharpen::ast::json))]
    Json(#[from] serde_json::Error),

    /// The document parsed but its ids do not line up.
    #[error("Malformed AST: {0}")]
    #[diagnostic(code(sharpen::ast::malformed))]
    Malformed(String),
}

/// Parses and validates a translation unit from JSON text.
pub fn parse_unit(json: &str) -> Result<TranslationUnit, AstError> {
    let unit: TranslationUnit = serde_json::from_str(json)?;
    unit.validate().map_err(AstError::Malformed)?;
    Ok(unit)
}

/// Reads a translation unit from a JSON file written by a front-end.
pub fn load_unit(path: &Path) -> Result<TranslationUnit, AstError> {
    let content = std::fs::read_to_string(path).map_err(|source| AstError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_unit(&content)
}

/// Serializes a unit in the same format [`load_unit`] reads.
pub fn store_unit(unit: &TranslationUnit) -> Result<String, AstError> {
    Ok(serde_json::to_string_pretty(unit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCT_UNIT: &str = r#"{
        "file": "ClangUnsavedFile.h",
        "top_level": [0],
        "decls": [
            {
                "kind": { "Record": { "tag": "Struct", "members": [1] } },
                "name": "MyStruct",
                "location": { "file": "ClangUnsavedFile.h", "line": 1, "column": 8 }
            },
            {
                "kind": { "Field": { "ty": 0 } },
                "name": "value",
                "parent": 0
            }
        ],
        "types": [
            { "kind": { "Builtin": "Int" }, "spelling": "int" }
        ]
    }"#;

    #[test]
    fn test_parse_front_end_document() {
        let unit = parse_unit(STRUCT_UNIT).expect("valid unit");
        assert_eq!(unit.top_level.len(), 1);
        assert_eq!(unit.decls[0].name, "MyStruct");
        assert_eq!(unit.decls[0].location.line, 1);
        assert_eq!(unit.record_members(crate::DeclId(0)).len(), 1);
    }

    #[test]
    fn test_rejects_dangling_reference() {
        let broken = STRUCT_UNIT.replace("\"members\": [1]", "\"members\": [7]");
        match parse_unit(&broken) {
            Err(AstError::Malformed(message)) => assert!(message.contains("#7")),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.json");
        std::fs::write(&path, STRUCT_UNIT).unwrap();
        let unit = load_unit(&path).unwrap();
        assert_eq!(unit.file, "ClangUnsavedFile.h");
    }
}
