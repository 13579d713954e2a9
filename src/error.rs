//! Bitácora de diagnósticos.
//!
//! Los hallazgos del análisis semántico nunca interrumpen la compilación.
//! Cada uno se agrega a [`Diagnostics`] junto con su severidad y su
//! ubicación, y una vez agregado no se remueve. Quien invoca el pipeline
//! debe revisar [`Diagnostics::has_errors()`] antes de confiar en los
//! artefactos generados.

use std::fmt::{self, Display};

use crate::{
    semantic::SemanticError,
    source::{Located, Position},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => fmt.write_str("info"),
            Severity::Warning => fmt.write_str("warning"),
            Severity::Error => fmt.write_str("error"),
        }
    }
}

#[derive(Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub error: Located<SemanticError>,
}

impl Diagnostic {
    pub fn message(&self) -> String {
        self.error.as_ref().to_string()
    }

    pub fn location(&self) -> Position {
        self.error.location()
    }

    pub fn line(&self) -> u32 {
        self.location().line()
    }

    pub fn column(&self) -> u32 {
        self.location().column()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Registro ordenado y de solo agregado.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, severity: Severity, error: Located<SemanticError>) {
        log::debug!("{} at {}: {}", severity, error.location(), error.as_ref());
        self.entries.push(Diagnostic { severity, error });
    }

    pub fn info(&mut self, error: SemanticError, at: Position) {
        self.push(Severity::Info, Located::at(error, at));
    }

    pub fn warning(&mut self, error: SemanticError, at: Position) {
        self.push(Severity::Warning, Located::at(error, at));
    }

    pub fn error(&mut self, error: SemanticError, at: Position) {
        self.push(Severity::Error, Located::at(error, at));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.iter().filter(|diagnostic| diagnostic.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vacía el registro entre compilaciones independientes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for diagnostic in &self.entries {
            writeln!(fmt, "{}: {}", diagnostic.severity, diagnostic.error.as_ref())?;
            writeln!(fmt, " --> {}", diagnostic.location())?;
            writeln!(fmt)?;
        }

        let errors = self.error_count();
        if errors == 0 {
            let warnings = self.warning_count();
            let warning_or_warnings = if warnings == 1 { "warning" } else { "warnings" };

            return writeln!(fmt, "Build succeeded with {} {}", warnings, warning_or_warnings);
        }

        let error_or_errors = if errors == 1 { "error" } else { "errors" };
        writeln!(fmt, "Build failed with {} {}", errors, error_or_errors)
    }
}
