//! End-to-end runs over AST files on disk.

use sharpen_build::GeneratorConfig;
use sharpen_clang::{store_unit, AstBuilder, RecordTag, StmtKind};
use sharpen_driver::{Driver, DriverError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_unit(dir: &Path, name: &str, build: impl FnOnce(&mut AstBuilder)) -> PathBuf {
    let mut b = AstBuilder::new(format!("{}.h", name));
    build(&mut b);
    let json = store_unit(&b.finish()).unwrap();
    let path = dir.join(format!("{}.ast.json", name));
    std::fs::write(&path, json).unwrap();
    path
}

fn config() -> GeneratorConfig {
    GeneratorConfig::default()
        .with_namespace("ClangSharp.Test")
        .with_library("ClangSharpPInvokeGenerator")
}

/// Units shared between headers merge into one file without duplicates.
#[test]
fn test_generate_and_merge() {
    let dir = TempDir::new().unwrap();
    let shared = |b: &mut AstBuilder| {
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, "MyShared");
        b.field(s, "x", int);
    };
    let first = write_unit(dir.path(), "first", |b| {
        shared(b);
        let void = b.void();
        let body = b.compound(vec![]);
        b.function(None, "MyFirst", void, vec![], Some(body));
    });
    let second = write_unit(dir.path(), "second", |b| {
        shared(b);
        let void = b.void();
        let body = b.compound(vec![]);
        b.function(None, "MySecond", void, vec![], Some(body));
    });

    let driver = Driver::new(config()).with_jobs(2);
    let generation = driver.generate(&[first, second]);
    assert!(!generation.has_failures());

    let output = dir.path().join("out.cs");
    driver.write_merged(&generation, &output).unwrap();
    let text = std::fs::read_to_string(&output).unwrap();
    assert_eq!(text.matches("public partial struct MyShared").count(), 1);
    let first_at = text.find("public static void MyFirst()").unwrap();
    let second_at = text.find("public static void MySecond()").unwrap();
    assert!(first_at < second_at);
}

/// One file per unit, named after the input.
#[test]
fn test_write_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_unit(dir.path(), "mystruct", |b| {
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, "MyStruct");
        b.field(s, "x", int);
    });

    let driver = Driver::new(config());
    let generation = driver.generate(&[path]);
    let out = dir.path().join("generated");
    let written = driver.write_dir(&generation, &out).unwrap();
    assert_eq!(written, vec![out.join("mystruct.cs")]);
    let text = std::fs::read_to_string(&written[0]).unwrap();
    assert!(text.starts_with("namespace ClangSharp.Test\n"));
}

/// A missing file and a malformed unit fail on their own; the good unit is
/// still emitted.
#[test]
fn test_failures_are_per_unit() {
    let dir = TempDir::new().unwrap();
    let good = write_unit(dir.path(), "good", |b| {
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, "MyStruct");
        b.field(s, "x", int);
    });
    let missing = dir.path().join("missing.ast.json");
    let garbage = dir.path().join("garbage.ast.json");
    std::fs::write(&garbage, "{ not json").unwrap();

    let driver = Driver::new(config());
    let generation = driver.generate(&[missing.clone(), good.clone(), garbage.clone()]);

    let order: Vec<&PathBuf> = generation.units.keys().collect();
    assert_eq!(order, vec![&missing, &good, &garbage]);
    assert_eq!(generation.emitted().count(), 1);
    assert_eq!(generation.failures().count(), 2);
    assert!(matches!(
        generation.units[&missing],
        Err(DriverError::Ast(sharpen_clang::AstError::Io { .. }))
    ));
    assert!(matches!(
        generation.units[&garbage],
        Err(DriverError::Ast(sharpen_clang::AstError::Json(_)))
    ));
}

/// Skipped declarations surface as diagnostics, not failures.
#[test]
fn test_diagnostics_are_collected() {
    let dir = TempDir::new().unwrap();
    let path = write_unit(dir.path(), "asm", |b| {
        let void = b.void();
        let asm = b.stmt(StmtKind::Other {
            kind: "GCCAsmStmt".to_string(),
        });
        let body = b.compound(vec![asm]);
        b.function(None, "MyFunction", void, vec![], Some(body));
    });

    let generation = Driver::new(config()).generate(&[path]);
    assert!(!generation.has_failures());
    let diagnostics: Vec<_> = generation.diagnostics().collect();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].is_error());
}

/// Configuration is read from TOML and validated.
#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sharpen.toml");
    std::fs::write(
        &path,
        "namespace = \"MyLib.Interop\"\nlibrary = \"mylib\"\nmethods-class = \"Native\"\n",
    )
    .unwrap();
    let driver = Driver::from_config_file(&path).unwrap();
    assert_eq!(driver.config().namespace, "MyLib.Interop");
    assert_eq!(driver.config().methods_class, "Native");

    std::fs::write(&path, "namespace = \"not a namespace\"\n").unwrap();
    assert!(matches!(
        Driver::from_config_file(&path),
        Err(DriverError::Config(_))
    ));
}

/// Inputs with the same file name in different directories do not
/// overwrite each other's output.
#[test]
fn test_write_dir_numbers_clashing_stems() {
    let dir = TempDir::new().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();
    let first = write_unit(&left, "mystruct", |b| {
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, "MyFirst");
        b.field(s, "x", int);
    });
    let second = write_unit(&right, "mystruct", |b| {
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, "MySecond");
        b.field(s, "x", int);
    });

    let driver = Driver::new(config()).with_jobs(2);
    let generation = driver.generate(&[first, second]);
    let out = dir.path().join("generated");
    let written = driver.write_dir(&generation, &out).unwrap();
    assert_eq!(
        written,
        vec![out.join("mystruct.cs"), out.join("mystruct_2.cs")]
    );
    let first_text = std::fs::read_to_string(&written[0]).unwrap();
    let second_text = std::fs::read_to_string(&written[1]).unwrap();
    assert!(first_text.contains("public partial struct MyFirst"));
    assert!(second_text.contains("public partial struct MySecond"));
}
