//! The error sink: parse, static, and runtime diagnostics with severity
//! and origin, plus terminal rendering.

use std::fmt;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

/// What failed at evaluation time. These abort the query immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Query timed out after {0} seconds")]
    Timeout(u64),
    #[error("Element limit of {0} exceeded")]
    ElementLimit(u64),
    #[error("Storage access failed: {0}")]
    Storage(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Encoding,
    Parse,
    Static,
    Runtime,
}

impl DiagnosticKind {
    fn word(self) -> &'static str {
        match self {
            DiagnosticKind::Encoding => "encoding",
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::Static => "static",
            DiagnosticKind::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Remark,
}

/// One recorded problem, rendered as
/// `line 12: parse error: Unknown query clause`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// 1-based source line; 0 for diagnostics without an origin line
    /// (encoding and runtime).
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn runtime(error: &RuntimeError) -> Self {
        Self {
            kind: DiagnosticKind::Runtime,
            severity: Severity::Error,
            line: 0,
            message: error.to_string(),
        }
    }

    pub fn remark(kind: DiagnosticKind, line: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Remark,
            line,
            message: message.into(),
        }
    }
}

impl From<&mapql_parser::Error> for Diagnostic {
    fn from(error: &mapql_parser::Error) -> Self {
        let kind = match error.kind() {
            mapql_parser::ErrorKind::Encoding => DiagnosticKind::Encoding,
            mapql_parser::ErrorKind::Parse => DiagnosticKind::Parse,
            mapql_parser::ErrorKind::Static => DiagnosticKind::Static,
        };
        Self {
            kind,
            severity: Severity::Error,
            line: error.line(),
            message: error.message().to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Remark => "remark",
        };
        if self.line == 0 {
            write!(f, "{} {severity}: {}", self.kind.word(), self.message)
        } else {
            write!(
                f,
                "line {}: {} {severity}: {}",
                self.line,
                self.kind.word(),
                self.message
            )
        }
    }
}

/// Accumulates diagnostics over a query's lifetime.
///
/// The sink never drops anything: callers query [`ErrorSink::has_errors`]
/// to decide whether evaluation may proceed, and [`ErrorSink::exit_code`]
/// after the run.
#[derive(Debug, Default)]
pub struct ErrorSink {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn absorb_parse_errors(&mut self, errors: &[mapql_parser::Error]) {
        for error in errors {
            self.report(error.into());
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Non-zero iff any error-severity diagnostic was recorded.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_errors())
    }
}

/// Renders one diagnostic as a labeled source excerpt for terminals.
pub fn cli_report(source: &str, diagnostic: &Diagnostic) -> String {
    let (start, end) = line_span(source, diagnostic.line);
    let kind = match diagnostic.severity {
        Severity::Error => ReportKind::Error,
        Severity::Remark => ReportKind::Advice,
    };
    let mut buffer = Vec::new();
    let report = Report::build(kind, (), start)
        .with_config(Config::default().with_color(false))
        .with_message(&diagnostic.message)
        .with_label(Label::new(start..end).with_message(format!(
            "{} {}",
            diagnostic.kind.word(),
            match diagnostic.severity {
                Severity::Error => "error",
                Severity::Remark => "remark",
            }
        )))
        .finish();
    let _ = report.write(Source::from(source), &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Byte span of a 1-based line, empty at the file start when unknown.
fn line_span(source: &str, line: u32) -> (usize, usize) {
    if line == 0 {
        return (0, 0);
    }
    let mut start = 0;
    for (i, text) in source.lines().enumerate() {
        let offset = text.as_ptr() as usize - source.as_ptr() as usize;
        if i as u32 + 1 == line {
            return (offset, offset + text.len());
        }
        start = offset;
    }
    (start, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_render_with_kind_and_line() {
        let d = Diagnostic {
            kind: DiagnosticKind::Parse,
            severity: Severity::Error,
            line: 12,
            message: "Unknown query clause".to_string(),
        };
        assert_eq!(d.to_string(), "line 12: parse error: Unknown query clause");
    }

    #[test]
    fn runtime_diagnostics_omit_the_line_prefix() {
        let d = Diagnostic::runtime(&RuntimeError::Timeout(25));
        assert_eq!(d.to_string(), "runtime error: Query timed out after 25 seconds");
    }

    #[test]
    fn remarks_render_as_remarks() {
        let d = Diagnostic::remark(DiagnosticKind::Static, 3, "shadowed set");
        assert_eq!(d.to_string(), "line 3: static remark: shadowed set");
    }

    #[test]
    fn exit_code_reflects_error_presence() {
        let mut sink = ErrorSink::new();
        assert_eq!(sink.exit_code(), 0);
        sink.report(Diagnostic::remark(DiagnosticKind::Parse, 1, "odd but fine"));
        assert_eq!(sink.exit_code(), 0);
        sink.report(Diagnostic::runtime(&RuntimeError::Other("boom".into())));
        assert_eq!(sink.exit_code(), 1);
    }
}
