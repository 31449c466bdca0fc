use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;

use crate::batch::{batch_convert_glob, BatchConvertOptions, DEFAULT_CONCURRENCY, STDOUT_EXTENSION};
use crate::convert::ConvertOptions;
use crate::document::{strip_annotations, Document};
use crate::format::Format;
use crate::formats::graphql::{self, GraphQlWriterOptions, UnsupportedBehavior};
use crate::formats::open_api::{self, OpenApiWriterOptions, SerializationFormat};
use crate::formats::suretype::{self, SureTypeWriterOptions};
use crate::formats::typescript::{self, TypeScriptWriterOptions};
use crate::formats::{core_types, json_schema};
use crate::graph::FormatGraph;
use crate::reader::Reader;
use crate::writer::Writer;

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    #[arg(
        value_name = "GLOB",
        required = true,
        help = "Glob patterns of files to convert"
    )]
    pub globs: Vec<String>,

    #[arg(long = "from-type", short = 'f', help = "Type system to convert from")]
    pub from_type: Format,

    #[arg(long = "to-type", short = 't', help = "Type system to convert to")]
    pub to_type: Format,

    #[arg(
        long = "output-directory",
        short = 'o',
        help = "Output directory. Defaults to the common root of the input files"
    )]
    pub output_directory: Option<PathBuf>,

    #[arg(
        long = "output-extension",
        short = 'O',
        help = "Output filename extension. Use '-' to write to stdout"
    )]
    pub output_extension: Option<String>,

    #[arg(long, short = 'v', help = "Print a line per converted file")]
    pub verbose: bool,

    #[arg(long, help = "Resolve and report, but write no files")]
    pub dry_run: bool,

    #[arg(long, help = "Skip hidden files and ignore gitignore files")]
    pub no_hidden: bool,

    #[arg(long, help = "Never use shortcut conversions between formats")]
    pub no_shortcut: bool,

    #[arg(long, help = "Skip the simplification pass")]
    pub no_simplify: bool,

    #[arg(long, help = "Merge intersections of objects into plain objects")]
    pub merge_objects: bool,

    #[arg(long, help = "Remove titles, descriptions and defaults from the output")]
    pub strip_annotations: bool,

    #[arg(
        long,
        default_value_t = DEFAULT_CONCURRENCY,
        help = "Maximum number of files converted concurrently"
    )]
    pub concurrency: usize,

    #[arg(
        long,
        value_enum,
        default_value = "yaml",
        help = "Open API serialization format"
    )]
    pub oapi_format: SerializationFormat,

    #[arg(long, help = "Open API document title. Defaults to the source filename")]
    pub oapi_title: Option<String>,

    #[arg(long, help = "Open API document version")]
    pub oapi_version: Option<String>,

    #[arg(long, help = "Emit TypeScript 'declare' declarations")]
    pub ts_declaration: bool,

    #[arg(long, help = "Print 'unknown' instead of 'any' in TypeScript output")]
    pub ts_unknown: bool,

    #[arg(long, help = "Skip the generated-file header in TypeScript output")]
    pub ts_no_descriptive_header: bool,

    #[arg(
        long,
        value_enum,
        default_value = "warn",
        help = "What to do with types GraphQL cannot express"
    )]
    pub gql_unsupported: UnsupportedBehavior,

    #[arg(long, help = "Scalar name to emit for 'null' in GraphQL output")]
    pub gql_null_typename: Option<String>,

    #[arg(long, help = "Skip 'type X = TypeOf<...>' exports in SureType output")]
    pub st_no_export_type: bool,

    #[arg(long, help = "Skip 'ensureX' exports in SureType output")]
    pub st_no_export_ensurer: bool,

    #[arg(long, help = "Skip 'isX' type-guard exports in SureType output")]
    pub st_no_export_type_guard: bool,
}

pub async fn run(args: ConvertArgs) -> i32 {
    match run_inner(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

async fn run_inner(args: ConvertArgs) -> Result<(), String> {
    let started = Instant::now();

    let graph = FormatGraph::with_default_formats();
    let reader = Arc::new(make_reader(&args));
    let writer = Arc::new(make_writer(&args));

    let mut convert_options = ConvertOptions::new();
    convert_options.shortcut = !args.no_shortcut;
    convert_options.no_simplify = args.no_simplify;
    convert_options.merge_objects = args.merge_objects;
    if args.strip_annotations {
        convert_options.transform = Some(Arc::new(|mut doc: Document| {
            let types = std::mem::take(&mut doc.types);
            doc.types = types.into_iter().map(strip_annotations).collect();
            doc
        }));
    }

    let batch_options = BatchConvertOptions {
        output_directory: args.output_directory.clone(),
        output_extension: args.output_extension.clone(),
        verbose: args.verbose,
        dry_run: args.dry_run,
        concurrency: args.concurrency,
        hidden: !args.no_hidden,
    };

    let result = batch_convert_glob(
        &graph,
        reader,
        writer,
        convert_options,
        &args.globs,
        &batch_options,
    )
    .await
    .map_err(|err| err.to_string())?;

    // Keep stdout clean for piped output.
    if args.output_extension.as_deref() != Some(STDOUT_EXTENSION) {
        let elapsed = started.elapsed().as_secs_f64();
        println!(
            "Converted {} in {}, in {}",
            console::style(format!("{} types", result.types)).bold(),
            console::style(format!("{} files", result.files)).bold(),
            console::style(format!("{elapsed:.2}s")).dim()
        );
    }

    Ok(())
}

fn make_reader(args: &ConvertArgs) -> Reader {
    match args.from_type {
        Format::Ts => typescript::reader(),
        Format::JsonSchema => json_schema::reader(),
        Format::GraphQl => graphql::reader(),
        Format::OpenApi => open_api::reader(),
        Format::SureType => suretype::reader(),
        Format::CoreTypes => core_types::reader(),
    }
}

fn make_writer(args: &ConvertArgs) -> Writer {
    match args.to_type {
        Format::Ts => typescript::writer(TypeScriptWriterOptions {
            declare: args.ts_declaration,
            use_unknown: args.ts_unknown,
            no_descriptive_header: args.ts_no_descriptive_header,
        }),
        Format::JsonSchema => json_schema::writer(),
        Format::GraphQl => graphql::writer(GraphQlWriterOptions {
            unsupported: args.gql_unsupported,
            null_type_name: args.gql_null_typename.clone(),
        }),
        Format::OpenApi => open_api::writer(OpenApiWriterOptions {
            format: args.oapi_format,
            title: args.oapi_title.clone(),
            version: args.oapi_version.clone(),
        }),
        Format::SureType => suretype::writer(SureTypeWriterOptions {
            export_type: !args.st_no_export_type,
            export_ensurer: !args.st_no_export_ensurer,
            export_type_guard: !args.st_no_export_type_guard,
        }),
        Format::CoreTypes => core_types::writer(),
    }
}
