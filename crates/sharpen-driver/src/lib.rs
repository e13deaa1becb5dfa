//! Runs the emitter over a batch of translation units.
//!
//! Units are loaded from the JSON a front-end wrote, emitted on a rayon
//! pool and collected in input order. A unit that fails to load
//! or is malformed fails alone; the others are still emitted.

use indexmap::IndexMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use sharpen_build::{BuildError, GeneratorConfig};
use sharpen_clang::{load_unit, AstError, TranslationUnit};
use sharpen_codegen::{CSharpGenerator, EmitError, EmittedUnit};
use sharpen_common::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, miette::Diagnostic)]
pub enum DriverError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ast(#[from] AstError),

    #[error("Failed to load configuration: {0}")]
    #[diagnostic(code(sharpen::config))]
    Config(#[from] BuildError),

    #[error("{path}: {source}")]
    #[diagnostic(code(sharpen::emit))]
    Emit {
        path: String,
        #[source]
        source: EmitError,
    },

    #[error("Failed to write {path}: {source}")]
    #[diagnostic(code(sharpen::io))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Emission results keyed by input path, in input order.
#[derive(Debug, Default)]
pub struct Generation {
    pub units: IndexMap<PathBuf, Result<EmittedUnit, DriverError>>,
}

impl Generation {
    pub fn emitted(&self) -> impl Iterator<Item = (&PathBuf, &EmittedUnit)> {
        self.units
            .iter()
            .filter_map(|(path, outcome)| outcome.as_ref().ok().map(|unit| (path, unit)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &DriverError)> {
        self.units
            .iter()
            .filter_map(|(path, outcome)| outcome.as_ref().err().map(|err| (path, err)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Diagnostics of every emitted unit, in input order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.emitted().flat_map(|(_, unit)| unit.diagnostics.iter())
    }

    /// Every emitted unit combined into one file.
    pub fn merged(&self) -> EmittedUnit {
        EmittedUnit::merge(self.emitted().map(|(_, unit)| unit.clone()))
    }
}

/// Emission pipeline for a fixed configuration.
pub struct Driver {
    generator: CSharpGenerator,
    jobs: usize,
}

impl Driver {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            generator: CSharpGenerator::new(config),
            jobs: 1,
        }
    }

    /// Loads and validates `sharpen.toml`-style configuration.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let config = GeneratorConfig::from_file(path.as_ref())?;
        Ok(Self::new(config))
    }

    /// Number of worker threads used by [`Driver::emit_units`].
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        self.generator.config()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Load and emit every file.
    #[tracing::instrument(skip_all, fields(files = paths.len(), jobs = self.jobs))]
    pub fn generate(&self, paths: &[PathBuf]) -> Generation {
        let mut loaded = Vec::with_capacity(paths.len());
        let mut generation = Generation::default();
        for path in paths {
            match load_unit(path) {
                Ok(unit) => {
                    // Holds the slot so results keep input order.
                    generation.units.insert(path.clone(), Ok(EmittedUnit::new(&unit.file)));
                    loaded.push((path.clone(), unit));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to load unit");
                    generation.units.insert(path.clone(), Err(err.into()));
                }
            }
        }

        for (path, outcome) in self.emit_units(loaded) {
            let outcome = outcome.map_err(|source| DriverError::Emit {
                path: path.display().to_string(),
                source,
            });
            generation.units.insert(path, outcome);
        }

        info!(
            emitted = generation.emitted().count(),
            failed = generation.failures().count(),
            "generation finished"
        );
        generation
    }

    /// Emit already-loaded units on a pool of the configured number of
    /// threads. Results keep the order of `units`.
    pub fn emit_units(
        &self,
        units: Vec<(PathBuf, TranslationUnit)>,
    ) -> Vec<(PathBuf, Result<EmittedUnit, EmitError>)> {
        let span = tracing::Span::current();
        let emit = |(path, unit): (PathBuf, TranslationUnit)| {
            let _entered = span.enter();
            debug!(path = %path.display(), "emitting unit");
            let outcome = self.generator.emit_unit(&unit);
            (path, outcome)
        };

        if self.jobs == 1 || units.len() < 2 {
            return units.into_iter().map(emit).collect();
        }
        match ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => pool.install(|| units.into_par_iter().map(emit).collect()),
            Err(err) => {
                warn!(error = %err, "failed to start worker pool, emitting serially");
                units.into_iter().map(emit).collect()
            }
        }
    }

    /// Write every unit merged into a single file.
    pub fn write_merged(&self, generation: &Generation, output: &Path) -> Result<(), DriverError> {
        let text = generation.merged().render(self.config());
        write(output, &text)
    }

    /// Write one `<stem>.cs` per emitted unit into `dir`. Inputs sharing a
    /// stem get numbered names (`<stem>_2.cs`, ...). Returns the written
    /// paths.
    pub fn write_dir(&self, generation: &Generation, dir: &Path) -> Result<Vec<PathBuf>, DriverError> {
        std::fs::create_dir_all(dir).map_err(|source| DriverError::Write {
            path: dir.display().to_string(),
            source,
        })?;
        let mut written = Vec::new();
        let mut stems: FxHashMap<String, usize> = FxHashMap::default();
        for (path, unit) in generation.emitted() {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unit");
            let stem = stem.strip_suffix(".ast").unwrap_or(stem);
            let seen = stems.entry(stem.to_string()).or_insert(0);
            *seen += 1;
            let target = if *seen == 1 {
                dir.join(format!("{}.cs", stem))
            } else {
                warn!(
                    path = %path.display(),
                    stem,
                    "output name already used by another input, numbering it"
                );
                dir.join(format!("{}_{}.cs", stem, seen))
            };
            write(&target, &unit.render(self.config()))?;
            written.push(target);
        }
        Ok(written)
    }
}

fn write(path: &Path, text: &str) -> Result<(), DriverError> {
    debug!(path = %path.display(), bytes = text.len(), "writing output");
    std::fs::write(path, text).map_err(|source| DriverError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpen_clang::{AstBuilder, RecordTag};

    fn unit(file: &str, name: &str) -> TranslationUnit {
        let mut b = AstBuilder::new(file);
        let int = b.int();
        let s = b.record(None, RecordTag::Struct, name);
        b.field(s, "x", int);
        b.finish()
    }

    #[test]
    fn test_emit_units_keeps_input_order() {
        let driver = Driver::new(GeneratorConfig::default()).with_jobs(3);
        let units: Vec<_> = (0..7)
            .map(|i| {
                let file = format!("unit{}.h", i);
                (PathBuf::from(&file), unit(&file, &format!("S{}", i)))
            })
            .collect();
        let results = driver.emit_units(units);
        let names: Vec<String> = results
            .iter()
            .map(|(_, r)| r.as_ref().unwrap().fragments[0].name.to_string())
            .collect();
        assert_eq!(names, vec!["S0", "S1", "S2", "S3", "S4", "S5", "S6"]);
    }

    #[test]
    fn test_jobs_are_at_least_one() {
        let driver = Driver::new(GeneratorConfig::default()).with_jobs(0);
        assert_eq!(driver.jobs(), 1);
        assert!(driver.emit_units(Vec::new()).is_empty());
    }
}
