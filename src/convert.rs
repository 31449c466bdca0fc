//! The converter: drives the data flow along a resolved graph path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::document::{simplify, Document, NamedType, SimplifyOptions};
use crate::error::Error;
use crate::file::{self, Source};
use crate::format::Format;
use crate::graph::{ConversionContext, ConversionOptions, FormatGraph, GraphPath, GraphPathSegment};
use crate::reader::{Conversion, Reader, ReaderOptions, WarnFn};
use crate::writer::{Writer, WriterOptions};

/// Per-type mapping function, applied after simplification.
pub type MapFn = Arc<dyn Fn(&NamedType, usize, &[NamedType]) -> NamedType + Send + Sync>;
/// Per-type filtering function, applied after `map`.
pub type FilterFn = Arc<dyn Fn(&NamedType, usize, &[NamedType]) -> bool + Send + Sync>;
/// Whole-document transform, applied after `filter`.
pub type TransformFn = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// Options for [`Converter::new`].
#[derive(Clone, Default)]
pub struct ConvertOptions {
    /// Working directory for file sources and targets. Defaults to the
    /// process working directory.
    pub cwd: Option<PathBuf>,
    /// Skip the simplification pass over the neutral document.
    pub no_simplify: bool,
    /// Merge object intersections into one self-contained object. Implies
    /// simplification.
    pub merge_objects: bool,
    pub map: Option<MapFn>,
    pub filter: Option<FilterFn>,
    pub transform: Option<TransformFn>,
    /// Prefer shortcut routes, falling back to the neutral format. Set to
    /// false to force the neutral route everywhere.
    pub shortcut: bool,
    /// Custom warn callback; defaults to logging through `tracing`.
    pub warn: Option<WarnFn>,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self {
            shortcut: true,
            ..Self::default()
        }
    }
}

impl fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("cwd", &self.cwd)
            .field("no_simplify", &self.no_simplify)
            .field("merge_objects", &self.merge_objects)
            .field("shortcut", &self.shortcut)
            .finish_non_exhaustive()
    }
}

/// Requested output file for a conversion.
#[derive(Debug, Clone)]
pub struct Target {
    pub filename: PathBuf,
    /// Path relative to the batch output root, for display and headers.
    pub rel_filename: Option<PathBuf>,
}

/// Converted/rejected type names for one side of a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionInfo {
    pub converted_types: Vec<String>,
    pub not_converted_types: Vec<String>,
}

/// The outcome of one full conversion. `data` is present only when no target
/// file was requested.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    pub input: ConversionInfo,
    pub output: ConversionInfo,
    pub data: Option<String>,
}

/// Output and bookkeeping of a single hop.
struct HopResult {
    output: String,
    converted: Vec<String>,
    not_converted: Vec<String>,
    out_converted: Vec<String>,
    out_not_converted: Vec<String>,
}

/// Append `extra` to `list`, keeping insertion order and dropping duplicates.
fn uniq_append(list: &mut Vec<String>, extra: Vec<String>) {
    for name in extra {
        if !list.contains(&name) {
            list.push(name);
        }
    }
}

/// A configured conversion pipeline from one format to another.
///
/// The route through the format graph is resolved once, at construction; a
/// missing route is a configuration error reported before any I/O happens.
pub struct Converter {
    reader: Arc<Reader>,
    writer: Arc<Writer>,
    path: GraphPath,
    options: ConvertOptions,
    cwd: PathBuf,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("from", &self.reader.kind())
            .field("to", &self.writer.kind())
            .field("hops", &self.path.len())
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(
        graph: &FormatGraph,
        reader: Arc<Reader>,
        writer: Arc<Writer>,
        options: ConvertOptions,
    ) -> Result<Self, Error> {
        let context = ConversionContext::new(
            graph,
            Arc::clone(&reader),
            Arc::clone(&writer),
            ConversionOptions {
                shortcut: if options.shortcut { Some(true) } else { Some(false) },
            },
        );
        let path = context.path().ok_or(Error::NoPath {
            from: reader.kind(),
            to: writer.kind(),
        })?;

        let cwd = match &options.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };

        Ok(Self {
            reader,
            writer,
            path,
            options,
            cwd,
        })
    }

    /// The source format of this converter.
    pub fn from_format(&self) -> Format {
        self.reader.kind()
    }

    /// The resolved route, one segment per hop.
    pub fn path(&self) -> &GraphPath {
        &self.path
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Convert one source. With a target, the output is persisted (unless it
    /// contains no converted types) and `data` is `None`; without one, the
    /// serialized result is returned inline.
    pub async fn convert(
        &self,
        from: &Source,
        to: Option<&Target>,
    ) -> Result<ConvertResult, Error> {
        let (data, filename) = self.read_source(from).await?;
        let input = data.as_deref().or(filename_str(&filename)).unwrap_or("");

        let rel = |path: &Path| file::rel_file(Some(&self.cwd), path);
        let rel_source = filename.as_deref().map(|f| rel(f));

        let warn = self.make_warn(filename.as_deref(), data.as_deref());
        let read_opts = ReaderOptions {
            warn: Arc::clone(&warn),
            filename: rel_source
                .as_deref()
                .map(|p| p.display().to_string()),
        };
        let write_opts = WriterOptions {
            warn,
            filename: to.map(|t| {
                t.rel_filename
                    .clone()
                    .unwrap_or_else(|| rel(&t.filename))
                    .display()
                    .to_string()
            }),
            source_filename: read_opts.filename.clone(),
            raw_input: data.clone(),
        };

        let result = self
            .run_path(input, &read_opts, &write_opts)
            .map_err(|err| err.decorate(read_opts.filename.as_deref(), data.as_deref()))?;

        let info_in = ConversionInfo {
            converted_types: result.converted,
            not_converted_types: result.not_converted,
        };
        let info_out = ConversionInfo {
            converted_types: result.out_converted,
            not_converted_types: result.out_not_converted,
        };

        let Some(target) = to else {
            return Ok(ConvertResult {
                input: info_in,
                output: info_out,
                data: Some(result.output),
            });
        };

        // Only write non-empty files.
        if !info_out.converted_types.is_empty() {
            let path = file::ensure_absolute(&target.filename, &self.cwd);
            file::write_file(&path, &result.output).await?;
        }

        Ok(ConvertResult {
            input: info_in,
            output: info_out,
            data: None,
        })
    }

    /// Resolve the source into text (or into a bare path for managed
    /// readers, which consume the filename itself).
    async fn read_source(
        &self,
        from: &Source,
    ) -> Result<(Option<String>, Option<PathBuf>), Error> {
        if self.reader.managed_read() {
            let Source::File { cwd, filename } = from else {
                return Err(Error::ManagedSourceRequired(self.reader.kind()));
            };
            return Ok((None, Some(file::ensure_absolute(filename, cwd))));
        }
        let source = file::get_source(from).await?;
        Ok((Some(source.data), source.filename))
    }

    fn make_warn(&self, filename: Option<&Path>, source: Option<&str>) -> WarnFn {
        let user_warn = self
            .options
            .warn
            .clone()
            .unwrap_or_else(crate::reader::tracing_warn);
        let filename = filename.map(|f| f.display().to_string());
        let source = source.map(str::to_string);
        Arc::new(move |message, meta| {
            let mut full = meta.cloned().unwrap_or_default();
            full.decorate(filename.as_deref(), source.as_deref());
            user_warn(message, Some(&full));
        })
    }

    /// Execute the resolved path on `input`.
    ///
    /// A single neutral-format segment runs the default pipeline (read,
    /// simplify, map, filter, transform, write). Anything longer feeds each
    /// hop's output text into the next hop.
    fn run_path(
        &self,
        input: &str,
        read_opts: &ReaderOptions,
        write_opts: &WriterOptions,
    ) -> Result<HopResult, Error> {
        if self.path.len() == 1 && self.path[0].format == Format::CoreTypes {
            return self.run_default(input, read_opts, write_opts);
        }

        let mut data = input.to_string();
        let mut converted: Vec<String> = Vec::new();
        let mut not_converted: Vec<String> = Vec::new();
        let mut out_converted: Vec<String> = Vec::new();
        let mut out_not_converted: Vec<String> = Vec::new();

        for (index, segment) in self.path.iter().enumerate() {
            let hop = run_segment(segment, &data, read_opts, write_opts)?;
            if index == 0 {
                converted = hop.converted;
            }
            uniq_append(&mut not_converted, hop.not_converted);
            uniq_append(&mut out_not_converted, hop.out_not_converted);
            out_converted = hop.out_converted;
            data = hop.output;
        }

        Ok(HopResult {
            output: data,
            converted,
            not_converted,
            out_converted,
            out_not_converted,
        })
    }

    fn run_default(
        &self,
        input: &str,
        read_opts: &ReaderOptions,
        write_opts: &WriterOptions,
    ) -> Result<HopResult, Error> {
        let read = self.reader.read(input, read_opts)?;

        let doc = if self.options.no_simplify && !self.options.merge_objects {
            read.data
        } else {
            simplify(
                read.data,
                SimplifyOptions {
                    merge_objects: self.options.merge_objects,
                },
            )
        };

        let mut doc = doc;
        if let Some(map) = &self.options.map {
            let original = std::mem::take(&mut doc.types);
            doc.types = original
                .iter()
                .enumerate()
                .map(|(index, ty)| map(ty, index, &original))
                .collect();
        }
        if let Some(filter) = &self.options.filter {
            let original = std::mem::take(&mut doc.types);
            doc.types = original
                .iter()
                .enumerate()
                .filter(|(index, ty)| filter(ty, *index, &original))
                .map(|(_, ty)| ty.clone())
                .collect();
        }
        let doc = match &self.options.transform {
            Some(transform) => transform(doc),
            None => doc,
        };

        let written = self.writer.write(&doc, write_opts)?;

        Ok(HopResult {
            output: written.data,
            converted: read.converted_types,
            not_converted: read.not_converted_types,
            out_converted: written.converted_types,
            out_not_converted: written.not_converted_types,
        })
    }
}

/// Run one hop: the canonical read/write pair through the neutral format, or
/// the reader/writer shortcut pair for a direct edge.
fn run_segment(
    segment: &GraphPathSegment,
    data: &str,
    read_opts: &ReaderOptions,
    write_opts: &WriterOptions,
) -> Result<HopResult, Error> {
    if segment.format == Format::CoreTypes {
        let read = segment.reader.read(data, read_opts)?;
        let written = segment.writer.write(&read.data, write_opts)?;
        Ok(HopResult {
            output: written.data,
            converted: read.converted_types,
            not_converted: read.not_converted_types,
            out_converted: written.converted_types,
            out_not_converted: written.not_converted_types,
        })
    } else {
        let read_shortcut = segment
            .reader
            .shortcut(segment.format)
            .ok_or_else(|| missing_shortcut(segment.reader.kind(), segment.format))?;
        let read: Conversion<String> = read_shortcut(data, read_opts)?;

        let write_shortcut = segment
            .writer
            .shortcut(segment.format)
            .ok_or_else(|| missing_shortcut(segment.format, segment.writer.kind()))?;
        let written = write_shortcut(&read.data, write_opts, read_opts)?;

        Ok(HopResult {
            output: written.data,
            converted: read.converted_types,
            not_converted: read.not_converted_types,
            out_converted: written.converted_types,
            out_not_converted: written.not_converted_types,
        })
    }
}

fn missing_shortcut(from: Format, to: Format) -> Error {
    // Paths only ever contain shortcut edges both ends declared, so this
    // indicates a registration bug rather than bad input.
    Error::NoPath { from, to }
}

fn filename_str(filename: &Option<PathBuf>) -> Option<&str> {
    filename.as_deref().and_then(Path::to_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Property, Type};
    use crate::error::ErrorMeta;
    use crate::reader::ReadFn;
    use crate::writer::WriteFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn json_doc() -> String {
        let doc = Document::new(vec![NamedType::new(
            "User",
            Type::Object {
                properties: vec![Property::new("name", Type::String, true)],
                additional: false,
            },
        )]);
        serde_json::to_string_pretty(&doc).unwrap()
    }

    fn ct_reader() -> Arc<Reader> {
        Arc::new(crate::formats::core_types::reader())
    }

    fn ct_writer() -> Arc<Writer> {
        Arc::new(crate::formats::core_types::writer())
    }

    fn graph() -> FormatGraph {
        let mut graph = FormatGraph::new();
        graph.register_reader(ct_reader());
        graph.register_writer(ct_writer());
        graph
    }

    #[tokio::test]
    async fn test_single_hop_roundtrip_preserves_type_names() {
        let converter = Converter::new(
            &graph(),
            ct_reader(),
            ct_writer(),
            ConvertOptions::new(),
        )
        .unwrap();
        let result = converter
            .convert(&Source::Data(json_doc()), None)
            .await
            .unwrap();
        assert_eq!(result.input.converted_types, vec!["User"]);
        assert_eq!(result.output.converted_types, vec!["User"]);
        assert!(result.input.not_converted_types.is_empty());
        assert!(result.data.is_some());
    }

    #[tokio::test]
    async fn test_map_filter_transform_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut options = ConvertOptions::new();
        let log = Arc::clone(&order);
        options.map = Some(Arc::new(move |ty, _, _| {
            log.lock().unwrap().push("map");
            ty.clone()
        }));
        let log = Arc::clone(&order);
        options.filter = Some(Arc::new(move |_, _, _| {
            log.lock().unwrap().push("filter");
            true
        }));
        let log = Arc::clone(&order);
        options.transform = Some(Arc::new(move |doc| {
            log.lock().unwrap().push("transform");
            doc
        }));

        let converter = Converter::new(&graph(), ct_reader(), ct_writer(), options).unwrap();
        converter
            .convert(&Source::Data(json_doc()), None)
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["map", "filter", "transform"]);
    }

    #[tokio::test]
    async fn test_filter_drops_types() {
        let mut options = ConvertOptions::new();
        options.filter = Some(Arc::new(|ty, _, _| ty.name != "User"));
        let converter = Converter::new(&graph(), ct_reader(), ct_writer(), options).unwrap();
        let result = converter
            .convert(&Source::Data(json_doc()), None)
            .await
            .unwrap();
        assert!(result.output.converted_types.is_empty());
    }

    #[tokio::test]
    async fn test_empty_output_skips_file_write() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = Target {
            filename: tmp.path().join("out.json"),
            rel_filename: None,
        };

        let mut options = ConvertOptions::new();
        options.filter = Some(Arc::new(|_, _, _| false));
        let converter = Converter::new(&graph(), ct_reader(), ct_writer(), options).unwrap();
        let result = converter
            .convert(&Source::Data(json_doc()), Some(&target))
            .await
            .unwrap();
        assert!(result.data.is_none());
        assert!(!target.filename.exists());
    }

    #[tokio::test]
    async fn test_warn_reports_not_converted_type() {
        let calls = Arc::new(AtomicUsize::new(0));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let mut options = ConvertOptions::new();
        let calls_in_warn = Arc::clone(&calls);
        let messages_in_warn = Arc::clone(&messages);
        options.warn = Some(Arc::new(move |message: &str, _: Option<&ErrorMeta>| {
            calls_in_warn.fetch_add(1, Ordering::SeqCst);
            messages_in_warn.lock().unwrap().push(message.to_string());
        }));

        // A writer that rejects every type, reporting through warn.
        let write: WriteFn = Arc::new(|doc, opts| {
            let mut not_converted = Vec::new();
            for named in &doc.types {
                (opts.warn)(&format!("Type '{}' not supported", named.name), None);
                not_converted.push(named.name.clone());
            }
            Ok(Conversion {
                data: String::new(),
                converted_types: vec![],
                not_converted_types: not_converted,
            })
        });
        let rejecting = Arc::new(Writer::new(Format::GraphQl, write));

        let converter = Converter::new(&graph(), ct_reader(), rejecting, options).unwrap();
        let result = converter
            .convert(&Source::Data(json_doc()), None)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *messages.lock().unwrap(),
            vec!["Type 'User' not supported".to_string()]
        );
        assert_eq!(result.output.not_converted_types, vec!["User"]);
    }

    #[tokio::test]
    async fn test_multi_hop_accumulates_rejections() {
        use Format::*;

        // jsc reader that can only shortcut into jsc; identity-ish hop that
        // rejects one type on the way.
        let read: ReadFn = Arc::new(|_, _| Ok(Conversion::complete(Document::new(vec![]), vec![])));
        let jsc_reader = Arc::new(
            Reader::new(JsonSchema, read).with_shortcut(
                JsonSchema,
                Arc::new(|data, _| {
                    Ok(Conversion {
                        data: data.to_string(),
                        converted_types: vec!["A".to_string(), "B".to_string()],
                        not_converted_types: vec!["C".to_string()],
                    })
                }),
            ),
        );

        let write: WriteFn = Arc::new(|_, _| Ok(Conversion::complete(String::new(), vec![])));
        let st_writer = Arc::new(
            Writer::new(SureType, write).with_shortcut(
                JsonSchema,
                Arc::new(|data, _, _| {
                    Ok(Conversion {
                        data: format!("// suretype\n{data}"),
                        converted_types: vec!["A".to_string()],
                        not_converted_types: vec!["B".to_string()],
                    })
                }),
            ),
        );

        let mut graph = FormatGraph::new();
        graph.register_reader(Arc::clone(&jsc_reader));
        graph.register_writer(Arc::clone(&st_writer));

        let converter = Converter::new(
            &graph,
            jsc_reader,
            st_writer,
            ConvertOptions::new(),
        )
        .unwrap();
        let result = converter
            .convert(&Source::Data("{}".to_string()), None)
            .await
            .unwrap();

        assert_eq!(result.input.converted_types, vec!["A", "B"]);
        assert_eq!(result.input.not_converted_types, vec!["C"]);
        assert_eq!(result.output.converted_types, vec!["A"]);
        assert_eq!(result.output.not_converted_types, vec!["B"]);
        assert!(result.data.unwrap().starts_with("// suretype"));
    }

    #[tokio::test]
    async fn test_managed_reader_rejects_inline_data() {
        let read: ReadFn = Arc::new(|_, _| Ok(Conversion::complete(Document::new(vec![]), vec![])));
        let managed = Arc::new(Reader::new(Format::SureType, read).managed());

        let converter = Converter::new(
            &FormatGraph::new(),
            managed,
            ct_writer(),
            ConvertOptions::new(),
        )
        .unwrap();
        let err = converter
            .convert(&Source::Data("v.object()".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ManagedSourceRequired(Format::SureType)));
    }
}
