//! Batch conversion: many input files through one converter, re-rooted under
//! an output directory, with bounded concurrency.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::convert::{ConvertOptions, ConvertResult, Converter, Target};
use crate::error::Error;
use crate::file::{self, RootedFile, Source};
use crate::graph::FormatGraph;
use crate::reader::Reader;
use crate::writer::Writer;

/// Output extension meaning "write to stdout instead of files".
pub const STDOUT_EXTENSION: &str = "-";

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Options for [`batch_convert`].
#[derive(Debug, Clone)]
pub struct BatchConvertOptions {
    /// Directory the output tree is rooted under. Defaults to the common
    /// root of the input files.
    pub output_directory: Option<PathBuf>,
    /// Extension for output files; defaults to the target format's own.
    /// [`STDOUT_EXTENSION`] sends everything to stdout.
    pub output_extension: Option<String>,
    /// Print a line per converted file.
    pub verbose: bool,
    /// Resolve and report, but write nothing.
    pub dry_run: bool,
    /// Maximum number of files converted at once.
    pub concurrency: usize,
    /// Include hidden files and honor gitignore files when globbing.
    pub hidden: bool,
}

impl Default for BatchConvertOptions {
    fn default() -> Self {
        Self {
            output_directory: None,
            output_extension: None,
            verbose: false,
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            hidden: true,
        }
    }
}

/// Totals over one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchConvertResult {
    /// Files that produced output.
    pub files: usize,
    /// Types converted across all files.
    pub types: usize,
}

/// Convert every file in `files` from `reader`'s format to `writer`'s.
///
/// Output paths mirror the input tree relative to its common root, re-rooted
/// under `output_directory` and with the extension swapped. Writing a file
/// onto its own input is refused. The first failing file aborts the batch.
pub async fn batch_convert(
    graph: &FormatGraph,
    reader: Arc<Reader>,
    writer: Arc<Writer>,
    convert_options: ConvertOptions,
    files: &[PathBuf],
    options: &BatchConvertOptions,
) -> Result<BatchConvertResult, Error> {
    let to_stdout = options.output_extension.as_deref() == Some(STDOUT_EXTENSION);
    let extension = match &options.output_extension {
        Some(ext) if !to_stdout => ext.clone(),
        _ => writer.kind().default_extension().to_string(),
    };

    let converter = Converter::new(graph, reader, writer, convert_options)?;
    let cwd = converter.cwd().to_path_buf();

    let rooted = file::re_root_files(files, &cwd, options.output_directory.as_deref());
    let jobs: Vec<RootedFile> = rooted
        .files
        .into_iter()
        .map(|mut job| {
            job.output = file::change_extension(&job.output, &extension);
            job
        })
        .collect();

    if !to_stdout {
        for job in &jobs {
            if job.input == job.output {
                return Err(Error::WouldOverwrite(job.input.display().to_string()));
            }
        }
    }

    let mut pending = jobs.iter();
    let mut running = FuturesUnordered::new();
    let mut totals = BatchConvertResult::default();

    let spawn = |job: &RootedFile| {
        let source = Source::File {
            cwd: cwd.clone(),
            filename: job.input.clone(),
        };
        let target = (!to_stdout && !options.dry_run).then(|| Target {
            filename: job.output.clone(),
            rel_filename: Some(file::change_extension(&job.rel, &extension)),
        });
        let converter = &converter;
        let job = job.clone();
        async move {
            let result = converter.convert(&source, target.as_ref()).await;
            (job, result)
        }
    };

    for job in pending.by_ref().take(options.concurrency.max(1)) {
        running.push(spawn(job));
    }

    while let Some((job, result)) = running.next().await {
        if let Some(next) = pending.next() {
            running.push(spawn(next));
        }
        let result = result?;

        if to_stdout {
            if let Some(data) = &result.data {
                println!("{data}");
            }
        }

        let converted = result.output.converted_types.len();
        if converted > 0 {
            totals.files += 1;
            totals.types += converted;
        }
        if options.verbose {
            print_file_line(&job, &result, options.dry_run);
        }
    }

    Ok(totals)
}

/// Resolve glob patterns and convert the matching files.
pub async fn batch_convert_glob(
    graph: &FormatGraph,
    reader: Arc<Reader>,
    writer: Arc<Writer>,
    convert_options: ConvertOptions,
    patterns: &[String],
    options: &BatchConvertOptions,
) -> Result<BatchConvertResult, Error> {
    let cwd = match &convert_options.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };
    let files = file::glob(patterns, &cwd, options.hidden)?;
    batch_convert(graph, reader, writer, convert_options, &files, options).await
}

fn print_file_line(job: &RootedFile, result: &ConvertResult, dry_run: bool) {
    let converted = result.output.converted_types.len();
    let rejected = result.output.not_converted_types.len();
    let total = converted + rejected;
    let percent = if total == 0 {
        100
    } else {
        converted * 100 / total
    };

    let mark = if converted > 0 {
        console::style("✓").green().to_string()
    } else {
        console::style("✗").red().to_string()
    };
    let suffix = if dry_run { " (dry run)" } else { "" };
    eprintln!(
        "{mark} {} ({converted} types, {percent}%){suffix}",
        file::pretty_file(&job.rel),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, NamedType, Type};
    use tempfile::TempDir;

    fn doc_json(name: &str) -> String {
        let doc = Document::new(vec![NamedType::new(name, Type::String)]);
        serde_json::to_string_pretty(&doc).unwrap()
    }

    fn ct_graph() -> (FormatGraph, Arc<Reader>, Arc<Writer>) {
        let reader = Arc::new(crate::formats::core_types::reader());
        let writer = Arc::new(crate::formats::core_types::writer());
        let mut graph = FormatGraph::new();
        graph.register_reader(Arc::clone(&reader));
        graph.register_writer(Arc::clone(&writer));
        (graph, reader, writer)
    }

    #[tokio::test]
    async fn test_batch_converts_tree_into_output_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("in/sub")).unwrap();
        std::fs::write(tmp.path().join("in/a.json"), doc_json("A")).unwrap();
        std::fs::write(tmp.path().join("in/sub/b.json"), doc_json("B")).unwrap();

        let (graph, reader, writer) = ct_graph();
        let mut convert_options = ConvertOptions::new();
        convert_options.cwd = Some(tmp.path().to_path_buf());

        let result = batch_convert(
            &graph,
            reader,
            writer,
            convert_options,
            &[PathBuf::from("in/a.json"), PathBuf::from("in/sub/b.json")],
            &BatchConvertOptions {
                output_directory: Some(PathBuf::from("out")),
                ..BatchConvertOptions::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(result, BatchConvertResult { files: 2, types: 2 });
        assert!(tmp.path().join("out/a.json").exists());
        assert!(tmp.path().join("out/sub/b.json").exists());
    }

    #[tokio::test]
    async fn test_batch_refuses_to_overwrite_input() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), doc_json("A")).unwrap();

        let (graph, reader, writer) = ct_graph();
        let mut convert_options = ConvertOptions::new();
        convert_options.cwd = Some(tmp.path().to_path_buf());

        // Same root, same extension: output would be the input itself.
        let err = batch_convert(
            &graph,
            reader,
            writer,
            convert_options,
            &[PathBuf::from("a.json")],
            &BatchConvertOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::WouldOverwrite(_)));
    }

    #[tokio::test]
    async fn test_batch_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), doc_json("A")).unwrap();

        let (graph, reader, writer) = ct_graph();
        let mut convert_options = ConvertOptions::new();
        convert_options.cwd = Some(tmp.path().to_path_buf());

        let result = batch_convert(
            &graph,
            reader,
            writer,
            convert_options,
            &[PathBuf::from("a.json")],
            &BatchConvertOptions {
                output_directory: Some(PathBuf::from("out")),
                dry_run: true,
                ..BatchConvertOptions::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(result.files, 1);
        assert!(!tmp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_batch_aborts_on_unreadable_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), doc_json("A")).unwrap();

        let (graph, reader, writer) = ct_graph();
        let mut convert_options = ConvertOptions::new();
        convert_options.cwd = Some(tmp.path().to_path_buf());

        let err = batch_convert(
            &graph,
            reader,
            writer,
            convert_options,
            &[PathBuf::from("a.json"), PathBuf::from("missing.json")],
            &BatchConvertOptions {
                output_directory: Some(PathBuf::from("out")),
                ..BatchConvertOptions::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
