//! Emitted fragments and final file rendering.

use crate::writer::CodeWriter;
use rustc_hash::FxHashSet;
use sharpen_build::GeneratorConfig;
use sharpen_common::Diagnostic;
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// `using` directives a unit needs, hoisted to the top of the file.
///
/// Both sets iterate in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usings {
    namespaces: BTreeSet<String>,
    statics: BTreeSet<String>,
}

impl Usings {
    pub fn add(&mut self, namespace: impl Into<String>) {
        self.namespaces.insert(namespace.into());
    }

    pub fn add_static(&mut self, type_name: impl Into<String>) {
        self.statics.insert(type_name.into());
    }

    pub fn extend(&mut self, other: &Usings) {
        self.namespaces.extend(other.namespaces.iter().cloned());
        self.statics.extend(other.statics.iter().cloned());
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty() && self.statics.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    pub fn statics(&self) -> impl Iterator<Item = &str> {
        self.statics.iter().map(String::as_str)
    }
}

/// Where a top-level fragment lands in the rendered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Directly inside the namespace (records, enums).
    Namespace,
    /// Inside the static methods class (functions, globals, constants).
    MethodsClass,
}

/// What a fragment's text is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Declaration,
    Statement,
    Expression,
}

/// A piece of emitted C#, unindented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// C# name of the declaration this fragment came from; empty for
    /// statements and expressions.
    pub name: SmolStr,
    pub text: String,
    pub placement: Placement,
    pub needs_unsafe: bool,
}

impl Fragment {
    pub fn declaration(name: impl Into<SmolStr>, text: String, placement: Placement) -> Self {
        Self {
            kind: FragmentKind::Declaration,
            name: name.into(),
            text,
            placement,
            needs_unsafe: false,
        }
    }

    /// A statement, which only ever lives in a method body.
    pub fn statement(text: String) -> Self {
        Self {
            kind: FragmentKind::Statement,
            name: SmolStr::default(),
            text,
            placement: Placement::MethodsClass,
            needs_unsafe: false,
        }
    }

    pub fn expression(text: String) -> Self {
        Self {
            kind: FragmentKind::Expression,
            ..Self::statement(text)
        }
    }

    pub fn with_unsafe(mut self, needs_unsafe: bool) -> Self {
        self.needs_unsafe = needs_unsafe;
        self
    }
}

/// Everything produced for one translation unit.
#[derive(Debug, Clone, Default)]
pub struct EmittedUnit {
    pub file: String,
    pub fragments: Vec<Fragment>,
    pub usings: Usings,
    pub diagnostics: Vec<Diagnostic>,
}

impl EmittedUnit {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn namespace_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments
            .iter()
            .filter(|f| f.placement == Placement::Namespace)
    }

    pub fn methods_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments
            .iter()
            .filter(|f| f.placement == Placement::MethodsClass)
    }

    /// Render the complete C# file.
    pub fn render(&self, config: &GeneratorConfig) -> String {
        let mut w = CodeWriter::new();

        if let Some(header) = &config.header {
            w.line(header.trim_end());
            w.blank();
        }

        for namespace in self.usings.namespaces() {
            w.line(&format!("using {};", namespace));
        }
        for type_name in self.usings.statics() {
            w.line(&format!("using static {};", type_name));
        }
        if !self.usings.is_empty() {
            w.blank();
        }

        w.line(&format!("namespace {}", config.namespace));
        w.open();

        let mut first = true;
        for fragment in self.namespace_fragments() {
            if !first {
                w.blank();
            }
            w.line(&fragment.text);
            first = false;
        }

        let methods: Vec<&Fragment> = self.methods_fragments().collect();
        if !methods.is_empty() {
            if !first {
                w.blank();
            }
            let unsafe_kw = if methods.iter().any(|f| f.needs_unsafe) {
                "unsafe "
            } else {
                ""
            };
            w.line(&format!(
                "public static {}partial class {}",
                unsafe_kw, config.methods_class
            ));
            w.open();
            for (index, fragment) in methods.iter().enumerate() {
                if index > 0 {
                    w.blank();
                }
                w.line(&fragment.text);
            }
            w.close();
        }

        w.close();
        w.finish()
    }

    /// Combine units into one file. Namespace-level declarations are
    /// deduplicated by name, keeping the first; headers shared by several
    /// units otherwise produce duplicate types.
    pub fn merge(units: impl IntoIterator<Item = EmittedUnit>) -> EmittedUnit {
        let mut merged = EmittedUnit::default();
        let mut seen: FxHashSet<(SmolStr, bool)> = FxHashSet::default();
        let mut files = Vec::new();

        for unit in units {
            files.push(unit.file);
            merged.usings.extend(&unit.usings);
            merged.diagnostics.extend(unit.diagnostics);
            for fragment in unit.fragments {
                let key = (
                    fragment.name.clone(),
                    fragment.placement == Placement::MethodsClass,
                );
                if seen.insert(key) {
                    merged.fragments.push(fragment);
                }
            }
        }

        merged.file = files.join(", ");
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeneratorConfig {
        GeneratorConfig::default().with_namespace("ClangSharp.Test")
    }

    #[test]
    fn test_render_empty_methods_class_is_omitted() {
        let mut unit = EmittedUnit::new("a.h");
        unit.fragments.push(Fragment::declaration(
            "MyStruct",
            "public partial struct MyStruct\n{\n}".to_string(),
            Placement::Namespace,
        ));
        assert_eq!(
            unit.render(&config()),
            "namespace ClangSharp.Test\n{\n    public partial struct MyStruct\n    {\n    }\n}\n"
        );
    }

    #[test]
    fn test_usings_are_sorted_and_statics_follow() {
        let mut unit = EmittedUnit::new("a.h");
        unit.usings.add("System.Runtime.InteropServices");
        unit.usings.add("System");
        unit.usings.add_static("ClangSharp.Test.MyEnum");
        unit.fragments.push(
            Fragment::declaration(
                "F",
                "public static void F()\n{\n}".to_string(),
                Placement::MethodsClass,
            )
            .with_unsafe(true),
        );
        let text = unit.render(&config());
        assert!(text.starts_with(
            "using System;\nusing System.Runtime.InteropServices;\nusing static ClangSharp.Test.MyEnum;\n\nnamespace ClangSharp.Test\n"
        ));
        assert!(text.contains("    public static unsafe partial class Methods\n"));
    }

    #[test]
    fn test_merge_deduplicates_types() {
        let fragment = Fragment::declaration("Shared", "struct".to_string(), Placement::Namespace);
        let mut a = EmittedUnit::new("a.h");
        a.fragments.push(fragment.clone());
        let mut b = EmittedUnit::new("b.h");
        b.fragments.push(fragment);
        b.usings.add("System");
        let merged = EmittedUnit::merge([a, b]);
        assert_eq!(merged.fragments.len(), 1);
        assert!(merged.usings.contains("System"));
        assert_eq!(merged.file, "a.h, b.h");
    }
}
