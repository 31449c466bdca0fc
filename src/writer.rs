use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::document::Document;
use crate::error::Error;
use crate::format::Format;
use crate::reader::{Conversion, ReaderOptions, WarnFn};

/// Options handed to a writer implementation.
#[derive(Clone)]
pub struct WriterOptions {
    pub warn: WarnFn,
    /// Target filename, when writing to a file. Relative to the cwd.
    pub filename: Option<String>,
    /// The filename the conversion originated from, for header comments.
    pub source_filename: Option<String>,
    /// The raw input text of the conversion, for error display.
    pub raw_input: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            warn: crate::reader::tracing_warn(),
            filename: None,
            source_filename: None,
            raw_input: None,
        }
    }
}

impl fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOptions")
            .field("filename", &self.filename)
            .field("source_filename", &self.source_filename)
            .finish_non_exhaustive()
    }
}

/// Serializes the neutral document into this writer's format.
pub type WriteFn =
    Arc<dyn Fn(&Document, &WriterOptions) -> Result<Conversion<String>, Error> + Send + Sync>;

/// Converts another format's text directly into this writer's output text,
/// bypassing the neutral document. Receives both writer and reader options
/// since it folds both sides into one call.
pub type ShortcutWriteFn = Arc<
    dyn Fn(&str, &WriterOptions, &ReaderOptions) -> Result<Conversion<String>, Error>
        + Send
        + Sync,
>;

/// Capability descriptor for one target format. Symmetric to
/// [`Reader`](crate::reader::Reader).
#[derive(Clone)]
pub struct Writer {
    kind: Format,
    write: WriteFn,
    shortcuts: BTreeMap<Format, ShortcutWriteFn>,
}

impl Writer {
    pub fn new(kind: Format, write: WriteFn) -> Self {
        Self {
            kind,
            write,
            shortcuts: BTreeMap::new(),
        }
    }

    /// Declare a direct transform from `format`'s text into this writer's
    /// output.
    pub fn with_shortcut(mut self, format: Format, shortcut: ShortcutWriteFn) -> Self {
        self.shortcuts.insert(format, shortcut);
        self
    }

    pub fn kind(&self) -> Format {
        self.kind
    }

    pub fn write(&self, doc: &Document, opts: &WriterOptions) -> Result<Conversion<String>, Error> {
        (self.write)(doc, opts)
    }

    pub fn shortcut(&self, format: Format) -> Option<&ShortcutWriteFn> {
        self.shortcuts.get(&format)
    }

    /// Formats this writer can be reached from via shortcut, in
    /// deterministic order.
    pub fn shortcut_formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.shortcuts.keys().copied()
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("kind", &self.kind)
            .field("shortcuts", &self.shortcuts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
