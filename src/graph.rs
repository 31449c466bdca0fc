//! The format-routing engine.
//!
//! A [`FormatGraph`] holds every registered [`Reader`] and [`Writer`] keyed by
//! format, and computes the sequence of conversions connecting an arbitrary
//! reader to an arbitrary writer. Shortcut edges (direct text-to-text
//! transforms between two non-neutral formats) are preferred when requested,
//! with the neutral "ct" route as the universal fallback.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::format::Format;
use crate::reader::Reader;
use crate::writer::Writer;

/// One hop of a conversion path: read via `reader` into `format`, hand the
/// resulting text to `writer`.
#[derive(Debug, Clone)]
pub struct GraphPathSegment {
    pub format: Format,
    pub reader: Arc<Reader>,
    pub writer: Arc<Writer>,
}

/// An ordered sequence of hops. The first segment's reader is the requested
/// reader, the last segment's writer the requested writer.
pub type GraphPath = Vec<GraphPathSegment>;

/// Deterministic key for a path, used for deduplication during search.
pub fn path_key(path: &[GraphPathSegment]) -> String {
    let mut key = String::new();
    for (index, segment) in path.iter().enumerate() {
        if index > 0 {
            key.push_str("  ");
        }
        let _ = write!(
            key,
            "{}->{{{}}}->{}",
            segment.reader.kind(),
            segment.format,
            segment.writer.kind()
        );
    }
    key
}

fn reader_id(reader: &Arc<Reader>) -> usize {
    Arc::as_ptr(reader) as usize
}

/// Search frame for the explicit-worklist traversal in
/// [`FormatGraph::find_all_paths`].
struct Frame {
    reader: Arc<Reader>,
    path: GraphPath,
    visited: Vec<usize>,
    allow_managed: bool,
}

/// The routing graph of registered readers and writers.
///
/// `Clone` produces structurally independent maps sharing the same
/// reader/writer instances, so ephemeral per-conversion registrations never
/// pollute a shared graph.
#[derive(Debug, Clone, Default)]
pub struct FormatGraph {
    /// Reader kind -> (reachable to-format -> reader).
    reader_graph: BTreeMap<Format, BTreeMap<Format, Arc<Reader>>>,
    /// From-format -> (writer kind -> writer).
    writer_graph: BTreeMap<Format, BTreeMap<Format, Arc<Writer>>>,
}

impl FormatGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph with all built-in formats registered with default options.
    pub fn with_default_formats() -> Self {
        let mut graph = Self::new();
        crate::formats::register_defaults(&mut graph);
        graph
    }

    /// Register a reader under the neutral format and each of its shortcut
    /// targets. A later registration of the same kind replaces the earlier
    /// one entirely.
    pub fn register_reader(&mut self, reader: Arc<Reader>) {
        let mut to_map = BTreeMap::new();
        to_map.insert(Format::CoreTypes, Arc::clone(&reader));
        for format in reader.shortcut_formats() {
            to_map.insert(format, Arc::clone(&reader));
        }
        self.reader_graph.insert(reader.kind(), to_map);
    }

    /// Register a writer under the neutral format and each of its shortcut
    /// sources. Unlike readers, writers of *different* kinds accumulate under
    /// the same from-format; only a writer of the same kind is replaced.
    pub fn register_writer(&mut self, writer: Arc<Writer>) {
        let mut insert = |from: Format| {
            self.writer_graph
                .entry(from)
                .or_default()
                .insert(writer.kind(), Arc::clone(&writer));
        };
        insert(Format::CoreTypes);
        for format in writer.shortcut_formats().collect::<Vec<_>>() {
            insert(format);
        }
    }

    /// Find every distinct path connecting `reader` to `writer`, ascending by
    /// hop count.
    ///
    /// The `shortcuts` flag is tri-state: `Some(false)` routes only through
    /// the neutral format, `Some(true)` only through declared shortcuts, and
    /// `None` considers both at every step.
    ///
    /// The traversal is an explicit worklist rather than recursion. Each
    /// frame carries the path so far and the set of visited readers (seeded
    /// with the initial reader, so no path ever contains the same reader
    /// twice). A managed reader is only permitted on the initial frame:
    /// intermediate hops operate on in-memory text, which a managed reader
    /// cannot accept.
    pub fn find_all_paths(
        &self,
        reader: &Arc<Reader>,
        writer: &Arc<Writer>,
        shortcuts: Option<bool>,
    ) -> Vec<GraphPath> {
        let mut found: BTreeMap<String, GraphPath> = BTreeMap::new();
        let mut stack = vec![Frame {
            reader: Arc::clone(reader),
            path: Vec::new(),
            visited: vec![reader_id(reader)],
            allow_managed: true,
        }];

        while let Some(frame) = stack.pop() {
            let formats: Vec<Format> = match shortcuts {
                Some(true) => frame.reader.shortcut_formats().collect(),
                Some(false) => vec![Format::CoreTypes],
                None => std::iter::once(Format::CoreTypes)
                    .chain(frame.reader.shortcut_formats())
                    .collect(),
            };

            for format in formats {
                let Some(writers) = self.writer_graph.get(&format) else {
                    continue;
                };
                for (kind, candidate) in writers {
                    if *kind == writer.kind() {
                        if frame.reader.managed_read() && !frame.allow_managed {
                            continue;
                        }
                        let mut path = frame.path.clone();
                        path.push(GraphPathSegment {
                            format,
                            reader: Arc::clone(&frame.reader),
                            writer: Arc::clone(writer),
                        });
                        found.entry(path_key(&path)).or_insert(path);
                    } else if *kind == frame.reader.kind() {
                        // Immediate reversal of the hop; skip.
                    } else if let Some(readers) = self.reader_graph.get(kind) {
                        let mut expanded = Vec::new();
                        for next in readers.values() {
                            let id = reader_id(next);
                            if expanded.contains(&id) {
                                continue;
                            }
                            expanded.push(id);
                            if next.managed_read() || frame.visited.contains(&id) {
                                continue;
                            }
                            let mut path = frame.path.clone();
                            path.push(GraphPathSegment {
                                format,
                                reader: Arc::clone(&frame.reader),
                                writer: Arc::clone(candidate),
                            });
                            let mut visited = frame.visited.clone();
                            visited.push(id);
                            stack.push(Frame {
                                reader: Arc::clone(next),
                                path,
                                visited,
                                allow_managed: false,
                            });
                        }
                    }
                }
            }
        }

        let mut paths: Vec<GraphPath> = found.into_values().collect();
        paths.sort_by_key(Vec::len);
        paths
    }

    /// Shortest path under the given shortcut preference, retrying
    /// unconstrained when the preference yields nothing. Returns `None` only
    /// when reader and writer cannot be connected at all, which callers must
    /// treat as a configuration error.
    pub fn find_best_path(
        &self,
        reader: &Arc<Reader>,
        writer: &Arc<Writer>,
        shortcut: Option<bool>,
    ) -> Option<GraphPath> {
        if let Some(path) = self.find_all_paths(reader, writer, shortcut).into_iter().next() {
            return Some(path);
        }
        if shortcut.is_none() {
            return None;
        }
        self.find_all_paths(reader, writer, None).into_iter().next()
    }
}

/// Options for a [`ConversionContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionOptions {
    /// `Some(true)` prefers shortcuts, `Some(false)` forbids them, `None`
    /// considers both routes equally.
    pub shortcut: Option<bool>,
}

/// Per-conversion view of a graph: clones the base graph and registers the
/// specific reader/writer instances involved (which may carry per-call
/// configuration), without mutating the shared graph.
#[derive(Debug)]
pub struct ConversionContext {
    reader: Arc<Reader>,
    writer: Arc<Writer>,
    shortcut: Option<bool>,
    graph: FormatGraph,
}

impl ConversionContext {
    pub fn new(
        base: &FormatGraph,
        reader: Arc<Reader>,
        writer: Arc<Writer>,
        options: ConversionOptions,
    ) -> Self {
        let mut graph = base.clone();
        graph.register_reader(Arc::clone(&reader));
        graph.register_writer(Arc::clone(&writer));
        Self {
            reader,
            writer,
            shortcut: options.shortcut,
            graph,
        }
    }

    /// The single best path for this conversion.
    pub fn path(&self) -> Option<GraphPath> {
        self.graph
            .find_best_path(&self.reader, &self.writer, self.shortcut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{Conversion, ReadFn, ShortcutReadFn};
    use crate::writer::{ShortcutWriteFn, WriteFn};

    fn fake_reader(kind: Format, shortcuts: &[Format], managed: bool) -> Arc<Reader> {
        let read: ReadFn = Arc::new(|_, _| {
            Ok(Conversion::complete(
                crate::document::Document::new(vec![]),
                vec![],
            ))
        });
        let mut reader = Reader::new(kind, read);
        if managed {
            reader = reader.managed();
        }
        for format in shortcuts {
            let shortcut: ShortcutReadFn =
                Arc::new(|data, _| Ok(Conversion::complete(data.to_string(), vec![])));
            reader = reader.with_shortcut(*format, shortcut);
        }
        Arc::new(reader)
    }

    fn fake_writer(kind: Format, shortcuts: &[Format]) -> Arc<Writer> {
        let write: WriteFn = Arc::new(|_, _| Ok(Conversion::complete(String::new(), vec![])));
        let mut writer = Writer::new(kind, write);
        for format in shortcuts {
            let shortcut: ShortcutWriteFn =
                Arc::new(|data, _, _| Ok(Conversion::complete(data.to_string(), vec![])));
            writer = writer.with_shortcut(*format, shortcut);
        }
        Arc::new(writer)
    }

    struct Fixture {
        graph: FormatGraph,
        ts_read: Arc<Reader>,
        st_read: Arc<Reader>,
        gql_write: Arc<Writer>,
        oapi_write: Arc<Writer>,
        st_write: Arc<Writer>,
    }

    /// A small topology with every interesting case: shortcuts between
    /// jsc, oapi and st, gql and ts only knowing the neutral route, and
    /// a managed st reader.
    fn fixture() -> Fixture {
        use Format::*;
        let mut graph = FormatGraph::new();

        let ts_read = fake_reader(Ts, &[], false);
        let st_read = fake_reader(SureType, &[JsonSchema], true);
        graph.register_reader(fake_reader(GraphQl, &[], false));
        graph.register_reader(fake_reader(JsonSchema, &[JsonSchema, OpenApi], false));
        graph.register_reader(fake_reader(OpenApi, &[JsonSchema, OpenApi], false));
        graph.register_reader(Arc::clone(&ts_read));
        graph.register_reader(Arc::clone(&st_read));

        let gql_write = fake_writer(GraphQl, &[]);
        let oapi_write = fake_writer(OpenApi, &[JsonSchema]);
        let st_write = fake_writer(SureType, &[JsonSchema]);
        graph.register_writer(Arc::clone(&gql_write));
        graph.register_writer(fake_writer(Ts, &[]));
        graph.register_writer(fake_writer(JsonSchema, &[JsonSchema]));
        graph.register_writer(Arc::clone(&oapi_write));
        graph.register_writer(Arc::clone(&st_write));

        Fixture {
            graph,
            ts_read,
            st_read,
            gql_write,
            oapi_write,
            st_write,
        }
    }

    #[test]
    fn test_neutral_route_always_exists() {
        let f = fixture();
        let paths = f.graph.find_all_paths(&f.ts_read, &f.gql_write, None);
        assert!(!paths.is_empty());
        assert_eq!(path_key(&paths[0]), "ts->{ct}->gql");
        assert_eq!(paths[0].len(), 1);
    }

    #[test]
    fn test_shortcuts_only_when_none_exist() {
        let f = fixture();
        let paths = f.graph.find_all_paths(&f.ts_read, &f.gql_write, Some(true));
        assert!(paths.is_empty());
    }

    #[test]
    fn test_shortcut_chain_has_no_neutral_segment() {
        let f = fixture();
        let paths = f.graph.find_all_paths(&f.st_read, &f.oapi_write, Some(true));
        assert!(!paths.is_empty());
        assert_eq!(path_key(&paths[0]), "st->{jsc}->oapi");
        for path in &paths {
            assert!(path.iter().all(|seg| seg.format != Format::CoreTypes));
        }
    }

    #[test]
    fn test_self_shortcut_enables_one_hop_cross_format_route() {
        use Format::*;
        let f = fixture();
        let jsc_read = fake_reader(JsonSchema, &[JsonSchema, OpenApi], false);
        let paths = f.graph.find_all_paths(&jsc_read, &f.oapi_write, Some(true));
        assert!(!paths.is_empty());
        assert_eq!(paths[0].len(), 1);
        assert_eq!(path_key(&paths[0]), "jsc->{jsc}->oapi");

        // Without the self edge the search only sees the oapi shortcut, and
        // the traversal never takes a self-loop hop, so no route remains.
        let bare = fake_reader(JsonSchema, &[OpenApi], false);
        assert!(f.graph.find_all_paths(&bare, &f.oapi_write, Some(true)).is_empty());
    }

    #[test]
    fn test_no_shortcuts_routes_through_neutral_only() {
        let f = fixture();
        let paths = f.graph.find_all_paths(&f.st_read, &f.oapi_write, Some(false));
        assert!(!paths.is_empty());
        for path in &paths {
            assert!(path.iter().all(|seg| seg.format == Format::CoreTypes));
        }
    }

    #[test]
    fn test_paths_are_deduplicated_and_cycle_free() {
        let f = fixture();
        let paths = f.graph.find_all_paths(&f.ts_read, &f.oapi_write, None);
        let keys: Vec<String> = paths.iter().map(|p| path_key(p)).collect();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keys.len());

        for path in &paths {
            let mut ids: Vec<usize> = path.iter().map(|seg| reader_id(&seg.reader)).collect();
            ids.sort_unstable();
            let before = ids.len();
            ids.dedup();
            assert_eq!(ids.len(), before, "a reader was revisited within a path");
        }
    }

    #[test]
    fn test_managed_reader_only_in_first_segment() {
        let f = fixture();
        // Examine every path in the whole fixture reachable from st.
        for writer in [&f.gql_write, &f.oapi_write, &f.st_write] {
            for path in f.graph.find_all_paths(&f.st_read, writer, None) {
                for segment in path.iter().skip(1) {
                    assert!(!segment.reader.managed_read());
                }
            }
        }
    }

    #[test]
    fn test_best_path_falls_back_to_unconstrained() {
        let f = fixture();
        // ts has no shortcuts at all, so the forced-shortcut search fails and
        // the unconstrained retry must produce the neutral route.
        let path = f
            .graph
            .find_best_path(&f.ts_read, &f.gql_write, Some(true))
            .unwrap();
        assert_eq!(path_key(&path), "ts->{ct}->gql");
    }

    #[test]
    fn test_best_path_is_shortest() {
        let f = fixture();
        let all = f.graph.find_all_paths(&f.st_read, &f.oapi_write, None);
        let best = f
            .graph
            .find_best_path(&f.st_read, &f.oapi_write, None)
            .unwrap();
        assert_eq!(best.len(), all[0].len());
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn test_reader_registration_overwrites() {
        use Format::*;
        let mut graph = FormatGraph::new();
        let ts_read = fake_reader(Ts, &[], false);
        graph.register_reader(Arc::clone(&ts_read));
        graph.register_writer(fake_writer(JsonSchema, &[]));
        let oapi_write = fake_writer(OpenApi, &[JsonSchema]);
        graph.register_writer(Arc::clone(&oapi_write));

        // A jsc reader able to shortcut into jsc enables the two-hop route
        // ts -> jsc -> oapi over the jsc shortcut edge.
        graph.register_reader(fake_reader(JsonSchema, &[JsonSchema], false));
        let keys: Vec<String> = graph
            .find_all_paths(&ts_read, &oapi_write, None)
            .iter()
            .map(|p| path_key(p))
            .collect();
        assert!(keys.contains(&"ts->{ct}->jsc  jsc->{jsc}->oapi".to_string()));

        // Re-registering the jsc reader without shortcuts replaces the old
        // entry entirely; the shortcut edge disappears.
        graph.register_reader(fake_reader(JsonSchema, &[], false));
        let keys: Vec<String> = graph
            .find_all_paths(&ts_read, &oapi_write, None)
            .iter()
            .map(|p| path_key(p))
            .collect();
        assert!(!keys.contains(&"ts->{ct}->jsc  jsc->{jsc}->oapi".to_string()));
        assert!(keys.contains(&"ts->{ct}->oapi".to_string()));
    }

    #[test]
    fn test_writer_registration_accumulates() {
        use Format::*;
        let mut graph = FormatGraph::new();
        let reader = fake_reader(JsonSchema, &[JsonSchema], false);
        graph.register_reader(Arc::clone(&reader));

        // Both writers declare a jsc shortcut; both must remain reachable
        // from the jsc from-format.
        let oapi_write = fake_writer(OpenApi, &[JsonSchema]);
        let st_write = fake_writer(SureType, &[JsonSchema]);
        graph.register_writer(Arc::clone(&oapi_write));
        graph.register_writer(Arc::clone(&st_write));

        assert!(!graph
            .find_all_paths(&reader, &oapi_write, Some(true))
            .is_empty());
        assert!(!graph
            .find_all_paths(&reader, &st_write, Some(true))
            .is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let f = fixture();
        let before: Vec<String> = f
            .graph
            .find_all_paths(&f.ts_read, &f.gql_write, None)
            .iter()
            .map(|p| path_key(p))
            .collect();

        let mut clone = f.graph.clone();
        clone.register_reader(fake_reader(Format::Ts, &[Format::JsonSchema], false));
        clone.register_writer(fake_writer(Format::GraphQl, &[Format::JsonSchema]));

        let after: Vec<String> = f
            .graph
            .find_all_paths(&f.ts_read, &f.gql_write, None)
            .iter()
            .map(|p| path_key(p))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_context_registers_ephemeral_instances() {
        let f = fixture();
        // A custom reader instance not present in the base graph.
        let custom = fake_reader(Format::GraphQl, &[], false);
        let context = ConversionContext::new(
            &f.graph,
            Arc::clone(&custom),
            Arc::clone(&f.st_write),
            ConversionOptions {
                shortcut: Some(true),
            },
        );
        // gql cannot reach jsc without the neutral route; the context must
        // fall back and still produce a path.
        let path = context.path().unwrap();
        assert_eq!(path_key(&path), "gql->{ct}->st");
        assert!(Arc::ptr_eq(&path[0].reader, &custom));
    }
}
