#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub mod batch;
mod cli;
pub mod convert;
pub mod document;
pub mod error;
pub mod file;
pub mod format;
pub mod formats;
pub mod graph;
pub mod reader;
pub mod writer;

pub use batch::{batch_convert, batch_convert_glob, BatchConvertOptions, BatchConvertResult};
pub use convert::{ConvertOptions, ConvertResult, Converter, Target};
pub use document::{Document, NamedType, Type};
pub use error::Error;
pub use file::Source;
pub use format::Format;
pub use graph::{ConversionContext, ConversionOptions, FormatGraph, GraphPath};
pub use reader::Reader;
pub use writer::Writer;

#[derive(Parser)]
#[command(
    name = "typebridge",
    version,
    about = "Convert type definitions between type systems"
)]
struct Cli {
    #[command(flatten)]
    args: cli::ConvertArgs,
}

/// Entry point for the binary. Returns the process exit code.
pub fn run_cli() -> i32 {
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to create tokio runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(async {
        match Cli::try_parse() {
            Ok(cli) => cli::run(cli.args).await,
            Err(e) => {
                let code = e.exit_code();
                let _ = e.print();
                code
            }
        }
    })
}

fn is_plain_level(value: &str) -> bool {
    matches!(value, "trace" | "debug" | "info" | "warn" | "error")
}

fn init_tracing() {
    let crate_root = module_path!().to_string();

    // TYPEBRIDGE_LOG controls log level: "trace", "debug", "info", "warn",
    // "error" or a full tracing filter spec like "typebridge=debug"
    let filter = match std::env::var("TYPEBRIDGE_LOG") {
        Ok(level) if is_plain_level(&level) => format!("{crate_root}={level}"),
        Ok(spec) => spec,
        Err(_) => format!("{crate_root}=warn"),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}
