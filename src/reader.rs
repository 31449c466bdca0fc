use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::document::Document;
use crate::error::{Error, ErrorMeta};
use crate::format::Format;

/// Callback for recoverable, type-level issues. Never used for fatal errors.
pub type WarnFn = Arc<dyn Fn(&str, Option<&ErrorMeta>) + Send + Sync>;

/// A warn callback that logs through `tracing`.
pub fn tracing_warn() -> WarnFn {
    Arc::new(|message, meta| {
        let rendered = match meta {
            Some(meta) => crate::error::format_error(message, meta),
            None => message.to_string(),
        };
        tracing::warn!("{rendered}");
    })
}

/// The outcome of one read or write hop: the produced data plus the names of
/// the types that were handled and those that were rejected.
#[derive(Debug, Clone)]
pub struct Conversion<T> {
    pub data: T,
    pub converted_types: Vec<String>,
    pub not_converted_types: Vec<String>,
}

impl<T> Conversion<T> {
    /// A conversion where every type was handled.
    pub fn complete(data: T, converted_types: Vec<String>) -> Self {
        Self {
            data,
            converted_types,
            not_converted_types: Vec::new(),
        }
    }
}

/// Options handed to a reader implementation.
#[derive(Clone)]
pub struct ReaderOptions {
    pub warn: WarnFn,
    /// Source filename, when reading from a file. Relative to the cwd.
    pub filename: Option<String>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            warn: tracing_warn(),
            filename: None,
        }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// Parses serialized source text into the neutral document. For managed
/// readers the input is a file path instead of text.
pub type ReadFn =
    Arc<dyn Fn(&str, &ReaderOptions) -> Result<Conversion<Document>, Error> + Send + Sync>;

/// Converts this reader's format's text directly into another format's text,
/// bypassing the neutral document.
pub type ShortcutReadFn =
    Arc<dyn Fn(&str, &ReaderOptions) -> Result<Conversion<String>, Error> + Send + Sync>;

/// Capability descriptor for one source format.
#[derive(Clone)]
pub struct Reader {
    kind: Format,
    managed_read: bool,
    read: ReadFn,
    shortcuts: BTreeMap<Format, ShortcutReadFn>,
}

impl Reader {
    pub fn new(kind: Format, read: ReadFn) -> Self {
        Self {
            kind,
            managed_read: false,
            read,
            shortcuts: BTreeMap::new(),
        }
    }

    /// Mark this reader as managed: `read` expects a file path, because
    /// correct parsing requires filesystem access.
    pub fn managed(mut self) -> Self {
        self.managed_read = true;
        self
    }

    /// Declare a direct transform from this reader's format into `format`.
    pub fn with_shortcut(mut self, format: Format, shortcut: ShortcutReadFn) -> Self {
        self.shortcuts.insert(format, shortcut);
        self
    }

    pub fn kind(&self) -> Format {
        self.kind
    }

    pub fn managed_read(&self) -> bool {
        self.managed_read
    }

    pub fn read(&self, data: &str, opts: &ReaderOptions) -> Result<Conversion<Document>, Error> {
        (self.read)(data, opts)
    }

    pub fn shortcut(&self, format: Format) -> Option<&ShortcutReadFn> {
        self.shortcuts.get(&format)
    }

    /// Formats this reader can shortcut to, in deterministic order.
    pub fn shortcut_formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.shortcuts.keys().copied()
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("kind", &self.kind)
            .field("managed_read", &self.managed_read)
            .field("shortcuts", &self.shortcuts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
