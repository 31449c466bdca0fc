use std::fmt::Write as _;

use crate::format::Format;

/// Line/column position within a source text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Metadata attached to conversion errors and warnings, used to render
/// code frames pointing at the offending source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMeta {
    pub filename: Option<String>,
    pub source: Option<String>,
    pub location: Option<Location>,
}

impl ErrorMeta {
    /// Fill in filename and source if they are not already set.
    ///
    /// Decoration is best-effort: existing metadata always wins, so an error
    /// decorated at an inner hop is not overwritten by an outer one.
    pub fn decorate(&mut self, filename: Option<&str>, source: Option<&str>) {
        if self.filename.is_none() {
            self.filename = filename.map(str::to_string);
        }
        if self.source.is_none() {
            self.source = source.map(str::to_string);
        }
    }
}

/// Errors produced by the conversion core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error: no route between the requested formats exists in
    /// the graph. Detected before any I/O.
    #[error("No conversion path from '{from}' to '{to}'")]
    NoPath { from: Format, to: Format },

    /// Domain error from a reader or writer (malformed input, unsupported
    /// construct with no rejection policy).
    #[error("{}", format_error(message, meta))]
    Conversion {
        message: String,
        meta: Box<ErrorMeta>,
    },

    /// A managed reader requires a file path, but the source was literal text.
    #[error("Reader for '{0}' requires a file, not in-memory text")]
    ManagedSourceRequired(Format),

    /// Batch conversion would overwrite an input file.
    #[error("Won't convert - would overwrite source file with target file: {0}")]
    WouldOverwrite(String),

    /// Invalid glob pattern or file walking failure.
    #[error("Failed to resolve files: {0}")]
    Glob(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a domain conversion error without location metadata.
    pub fn conversion(message: impl Into<String>) -> Self {
        Error::Conversion {
            message: message.into(),
            meta: Box::default(),
        }
    }

    /// Create a domain conversion error pointing at a source location.
    pub fn conversion_at(message: impl Into<String>, location: Location) -> Self {
        Error::Conversion {
            message: message.into(),
            meta: Box::new(ErrorMeta {
                location: Some(location),
                ..ErrorMeta::default()
            }),
        }
    }

    /// Attach source text and filename to a conversion error, preserving the
    /// error kind and any metadata already present.
    pub fn decorate(mut self, filename: Option<&str>, source: Option<&str>) -> Self {
        if let Error::Conversion { meta, .. } = &mut self {
            meta.decorate(filename, source);
        }
        self
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        let location = (err.line() > 0).then(|| Location {
            line: err.line(),
            column: err.column().max(1),
        });
        Error::Conversion {
            message: format!("Invalid JSON: {err}"),
            meta: Box::new(ErrorMeta {
                location,
                ..ErrorMeta::default()
            }),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        let location = err.location().map(|loc| Location {
            line: loc.line(),
            column: loc.column(),
        });
        Error::Conversion {
            message: format!("Invalid YAML: {err}"),
            meta: Box::new(ErrorMeta {
                location,
                ..ErrorMeta::default()
            }),
        }
    }
}

/// Render a message with a code frame when source and location are available.
///
/// Falls back to the plain message (with an optional `filename:line:col`
/// prefix) when the source text is missing.
pub fn format_error(message: &str, meta: &ErrorMeta) -> String {
    let Some(location) = meta.location else {
        return match &meta.filename {
            Some(filename) => format!("{filename}: {message}"),
            None => message.to_string(),
        };
    };

    let mut out = String::new();
    if let Some(filename) = &meta.filename {
        let _ = writeln!(out, "{filename}:{}:{}", location.line, location.column);
    }
    let _ = write!(out, "{message}");

    if let Some(source) = &meta.source {
        if let Some(frame) = code_frame(source, location) {
            let _ = write!(out, "\n{frame}");
        }
    }

    out
}

/// A minimal code frame: up to two lines of context before the offending
/// line, the line itself, and a caret marker under the column.
fn code_frame(source: &str, location: Location) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    if location.line == 0 || location.line > lines.len() {
        return None;
    }

    let first = location.line.saturating_sub(2).max(1);
    let width = location.line.to_string().len();

    let mut out = String::new();
    for number in first..=location.line {
        let marker = if number == location.line { ">" } else { " " };
        let _ = writeln!(out, "{marker} {number:>width$} | {}", lines[number - 1]);
    }
    let _ = write!(
        out,
        "  {:>width$} | {}^",
        "",
        " ".repeat(location.column.saturating_sub(1))
    );
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_without_location() {
        let meta = ErrorMeta {
            filename: Some("foo.json".to_string()),
            ..ErrorMeta::default()
        };
        assert_eq!(format_error("bad input", &meta), "foo.json: bad input");
    }

    #[test]
    fn test_format_error_with_code_frame() {
        let meta = ErrorMeta {
            filename: Some("foo.json".to_string()),
            source: Some("{\n  \"a\": nope\n}".to_string()),
            location: Some(Location { line: 2, column: 8 }),
        };
        let rendered = format_error("Invalid JSON", &meta);
        assert!(rendered.starts_with("foo.json:2:8"));
        assert!(rendered.contains("> 2 |   \"a\": nope"));
        assert!(rendered.ends_with("       ^"));
    }

    #[test]
    fn test_decorate_does_not_overwrite() {
        let err = Error::conversion("oops").decorate(Some("a.ts"), Some("first"));
        let err = err.decorate(Some("b.ts"), Some("second"));
        match err {
            Error::Conversion { meta, .. } => {
                assert_eq!(meta.filename.as_deref(), Some("a.ts"));
                assert_eq!(meta.source.as_deref(), Some("first"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_json_error_location() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{ nope }")
            .unwrap_err()
            .into();
        match err {
            Error::Conversion { meta, .. } => {
                assert_eq!(meta.location.map(|l| l.line), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
