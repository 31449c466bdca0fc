//! Open API ("oapi") reader and writer.
//!
//! Open API 3 carries plain JSON Schema under `components.schemas`, so both
//! directions delegate to the schema translation in
//! [`json_schema`](crate::formats::json_schema) and only add the document
//! wrapper, the reference prefix and JSON/YAML serialization.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Error;
use crate::format::Format;
use crate::formats::json_schema::{
    self, definitions_of, document_to_schemas, parse_json_or_yaml, rewrite_refs,
    schemas_to_document, COMPONENTS_REF, DEFINITIONS_REF,
};
use crate::reader::{Conversion, ReadFn, Reader, ShortcutReadFn};
use crate::writer::{ShortcutWriteFn, WriteFn, Writer};

/// On-disk representation of the written document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SerializationFormat {
    Json,
    #[default]
    Yaml,
}

/// Options for the Open API writer.
#[derive(Debug, Clone, Default)]
pub struct OpenApiWriterOptions {
    pub format: SerializationFormat,
    /// Title for the `info` object; defaults to the source filename.
    pub title: Option<String>,
    /// Version for the `info` object.
    pub version: Option<String>,
}

pub(crate) fn serialize(value: &Value, format: SerializationFormat) -> Result<String, Error> {
    match format {
        SerializationFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        SerializationFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

/// The named schemas of an Open API document: `components.schemas`.
pub(crate) fn schemas_of(root: &Value) -> Result<&Map<String, Value>, Error> {
    root.get("components")
        .and_then(|components| components.get("schemas"))
        .and_then(Value::as_object)
        .ok_or_else(|| Error::conversion("Expected a top-level 'components.schemas' object"))
}

/// Wrap named schemas in a minimal Open API 3 document.
pub(crate) fn wrap_schemas(
    schemas: Map<String, Value>,
    title: Option<&str>,
    version: &str,
) -> Value {
    let mut info = Map::new();
    info.insert(
        "title".into(),
        title.unwrap_or("Converted types").into(),
    );
    info.insert("version".into(), version.into());

    let mut components = Map::new();
    components.insert("schemas".into(), Value::Object(schemas));

    let mut root = Map::new();
    root.insert("openapi".into(), "3.0.0".into());
    root.insert("info".into(), Value::Object(info));
    root.insert("paths".into(), Value::Object(Map::new()));
    root.insert("components".into(), Value::Object(components));
    Value::Object(root)
}

pub fn reader() -> Reader {
    let read: ReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let schemas = schemas_of(&root)?;
        Ok(schemas_to_document(schemas, COMPONENTS_REF, opts))
    });

    // Unwrap into a plain JSON Schema document, keeping the raw schemas.
    let to_json_schema: ShortcutReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let mut schemas = schemas_of(&root)?.clone();
        for schema in schemas.values_mut() {
            rewrite_refs(schema, COMPONENTS_REF, DEFINITIONS_REF);
        }
        let names: Vec<String> = schemas.keys().cloned().collect();
        let wrapped = json_schema::wrap_definitions(schemas);
        Ok(Conversion::complete(
            serde_json::to_string_pretty(&wrapped)?,
            names,
        ))
    });

    // Self edge: normalize to JSON and report the type names, leaving the
    // document untouched. Required for one-hop routes that terminate here.
    let to_open_api: ShortcutReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let names: Vec<String> = schemas_of(&root)?.keys().cloned().collect();
        Ok(Conversion::complete(serde_json::to_string_pretty(&root)?, names))
    });

    Reader::new(Format::OpenApi, read)
        .with_shortcut(Format::JsonSchema, to_json_schema)
        .with_shortcut(Format::OpenApi, to_open_api)
}

pub fn writer(options: OpenApiWriterOptions) -> Writer {
    let write_options = options.clone();
    let write: WriteFn = Arc::new(move |doc, opts| {
        let schemas = document_to_schemas(doc, COMPONENTS_REF);
        let names = doc.type_names();
        let title = write_options
            .title
            .as_deref()
            .or(opts.source_filename.as_deref());
        let wrapped = wrap_schemas(
            schemas,
            title,
            write_options.version.as_deref().unwrap_or("1"),
        );
        Ok(Conversion::complete(
            serialize(&wrapped, write_options.format)?,
            names,
        ))
    });

    let identity_options = options.clone();
    // Self edge, mirroring the reader's, re-serialized per the writer options.
    let from_open_api: ShortcutWriteFn = Arc::new(move |data, _wopts, ropts| {
        let root = parse_json_or_yaml(data, ropts.filename.as_deref())?;
        let names: Vec<String> = schemas_of(&root)?.keys().cloned().collect();
        Ok(Conversion::complete(
            serialize(&root, identity_options.format)?,
            names,
        ))
    });

    let shortcut_options = options;
    let from_json_schema: ShortcutWriteFn = Arc::new(move |data, wopts, ropts| {
        let root = parse_json_or_yaml(data, ropts.filename.as_deref())?;
        let mut schemas = definitions_of(&root)?.clone();
        for schema in schemas.values_mut() {
            rewrite_refs(schema, DEFINITIONS_REF, COMPONENTS_REF);
        }
        let names: Vec<String> = schemas.keys().cloned().collect();
        let title = shortcut_options
            .title
            .as_deref()
            .or(wopts.source_filename.as_deref());
        let wrapped = wrap_schemas(
            schemas,
            title,
            shortcut_options.version.as_deref().unwrap_or("1"),
        );
        Ok(Conversion::complete(
            serialize(&wrapped, shortcut_options.format)?,
            names,
        ))
    });

    Writer::new(Format::OpenApi, write)
        .with_shortcut(Format::JsonSchema, from_json_schema)
        .with_shortcut(Format::OpenApi, from_open_api)
}
