//! JSON Schema ("jsc") reader and writer.
//!
//! Also home of the schema-to-document translation shared with the Open API
//! format, which stores the same schema dialect under a different wrapper
//! and reference prefix.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::document::{Annotations, Document, NamedType, Property, Type};
use crate::error::Error;
use crate::format::Format;
use crate::formats::open_api;
use crate::reader::{Conversion, ReadFn, Reader, ReaderOptions, ShortcutReadFn};
use crate::writer::{ShortcutWriteFn, WriteFn, Writer};

pub(crate) const DEFINITIONS_REF: &str = "#/definitions/";
pub(crate) const COMPONENTS_REF: &str = "#/components/schemas/";

const SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Parse schema text that may be JSON or YAML. A `.yaml`/`.yml` filename
/// forces YAML; otherwise JSON is tried first and its error is reported when
/// neither parses.
pub(crate) fn parse_json_or_yaml(data: &str, filename: Option<&str>) -> Result<Value, Error> {
    let yaml_first = filename.is_some_and(|f| f.ends_with(".yaml") || f.ends_with(".yml"));
    if yaml_first {
        return Ok(serde_yaml::from_str(data)?);
    }
    match serde_json::from_str(data) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_str(data).map_err(|_| json_err.into()),
    }
}

/// The named schemas of a JSON Schema document: `definitions` or `$defs`.
pub(crate) fn definitions_of(root: &Value) -> Result<&Map<String, Value>, Error> {
    root.get("definitions")
        .or_else(|| root.get("$defs"))
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::conversion("Expected a top-level 'definitions' (or '$defs') object")
        })
}

/// Translate a map of named schemas into the neutral document. Schemas using
/// constructs outside the supported subset are reported through `warn` and
/// listed as not converted.
pub(crate) fn schemas_to_document(
    schemas: &Map<String, Value>,
    ref_prefix: &str,
    opts: &ReaderOptions,
) -> Conversion<Document> {
    let mut types = Vec::new();
    let mut converted = Vec::new();
    let mut not_converted = Vec::new();

    for (name, schema) in schemas {
        match schema_to_type(schema, ref_prefix) {
            Ok((ty, annotations)) => {
                types.push(NamedType {
                    name: name.clone(),
                    ty,
                    annotations,
                });
                converted.push(name.clone());
            }
            Err(reason) => {
                (opts.warn)(&format!("Type '{name}' not converted: {reason}"), None);
                not_converted.push(name.clone());
            }
        }
    }

    Conversion {
        data: Document::new(types),
        converted_types: converted,
        not_converted_types: not_converted,
    }
}

fn schema_to_type(value: &Value, ref_prefix: &str) -> Result<(Type, Annotations), String> {
    match value {
        Value::Bool(true) => Ok((Type::Any, Annotations::default())),
        Value::Bool(false) => Err("the 'false' schema matches nothing".to_string()),
        Value::Object(schema) => object_schema_to_type(schema, ref_prefix),
        other => Err(format!("expected a schema object, got {other}")),
    }
}

fn object_schema_to_type(
    schema: &Map<String, Value>,
    ref_prefix: &str,
) -> Result<(Type, Annotations), String> {
    let annotations = Annotations {
        title: schema
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        description: schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        default: schema.get("default").cloned(),
    };

    if let Some(reference) = schema.get("$ref") {
        let reference = reference.as_str().ok_or("$ref must be a string")?;
        let target = reference
            .strip_prefix(ref_prefix)
            .ok_or_else(|| format!("unresolvable reference '{reference}'"))?;
        return Ok((
            Type::Ref {
                target: target.to_string(),
            },
            annotations,
        ));
    }

    if let Some(value) = schema.get("const") {
        return Ok((
            Type::Const {
                value: value.clone(),
            },
            annotations,
        ));
    }

    if let Some(values) = schema.get("enum") {
        let values = values.as_array().ok_or("enum must be an array")?;
        let mut members: Vec<Type> = values
            .iter()
            .map(|value| Type::Const {
                value: value.clone(),
            })
            .collect();
        let ty = if members.len() == 1 {
            members.remove(0)
        } else {
            Type::Or { members }
        };
        return Ok((ty, annotations));
    }

    for (keyword, union) in [("anyOf", true), ("oneOf", true), ("allOf", false)] {
        let Some(values) = schema.get(keyword) else {
            continue;
        };
        let values = values
            .as_array()
            .ok_or_else(|| format!("{keyword} must be an array"))?;
        let members = values
            .iter()
            .map(|value| schema_to_type(value, ref_prefix).map(|(ty, _)| ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ty = if union {
            Type::Or { members }
        } else {
            Type::And { members }
        };
        return Ok((ty, annotations));
    }

    let ty = match schema.get("type") {
        Some(Value::String(name)) => typed_schema(name, schema, ref_prefix)?,
        Some(Value::Array(names)) => {
            let members = names
                .iter()
                .map(|name| {
                    let name = name.as_str().ok_or("type array entries must be strings")?;
                    typed_schema(name, schema, ref_prefix)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Type::Or { members }
        }
        Some(other) => return Err(format!("invalid 'type' value: {other}")),
        // Untyped schemas still describe objects or arrays when they carry
        // the corresponding keywords.
        None if schema.contains_key("properties") => object_type(schema, ref_prefix)?,
        None if schema.contains_key("items") => typed_schema("array", schema, ref_prefix)?,
        None => Type::Any,
    };
    Ok((ty, annotations))
}

fn typed_schema(
    name: &str,
    schema: &Map<String, Value>,
    ref_prefix: &str,
) -> Result<Type, String> {
    Ok(match name {
        "null" => Type::Null,
        "boolean" => Type::Boolean,
        "integer" => Type::Integer,
        "number" => Type::Number,
        "string" => Type::String,
        "array" => match schema.get("items") {
            Some(Value::Array(items)) => Type::Tuple {
                items: items
                    .iter()
                    .map(|item| schema_to_type(item, ref_prefix).map(|(ty, _)| ty))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            Some(items) => Type::Array {
                items: Box::new(schema_to_type(items, ref_prefix)?.0),
            },
            None => Type::Array {
                items: Box::new(Type::Any),
            },
        },
        "object" => object_type(schema, ref_prefix)?,
        other => return Err(format!("unknown type '{other}'")),
    })
}

fn object_type(schema: &Map<String, Value>, ref_prefix: &str) -> Result<Type, String> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut properties = Vec::new();
    if let Some(props) = schema.get("properties") {
        let props = props.as_object().ok_or("properties must be an object")?;
        for (name, prop) in props {
            let (ty, annotations) = schema_to_type(prop, ref_prefix)?;
            properties.push(Property {
                name: name.clone(),
                ty,
                required: required.contains(&name.as_str()),
                annotations,
            });
        }
    }

    let additional = !matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));
    Ok(Type::Object {
        properties,
        additional,
    })
}

/// Serialize a type node back into a schema object.
pub(crate) fn type_to_schema(ty: &Type, annotations: &Annotations, ref_prefix: &str) -> Value {
    let none = Annotations::default();
    let mut schema = Map::new();

    match ty {
        Type::Any => {}
        Type::Null => {
            schema.insert("type".into(), "null".into());
        }
        Type::Boolean => {
            schema.insert("type".into(), "boolean".into());
        }
        Type::Integer => {
            schema.insert("type".into(), "integer".into());
        }
        Type::Number => {
            schema.insert("type".into(), "number".into());
        }
        Type::String => {
            schema.insert("type".into(), "string".into());
        }
        Type::Const { value } => {
            schema.insert("const".into(), value.clone());
        }
        Type::Array { items } => {
            schema.insert("type".into(), "array".into());
            schema.insert("items".into(), type_to_schema(items, &none, ref_prefix));
        }
        Type::Tuple { items } => {
            schema.insert("type".into(), "array".into());
            schema.insert(
                "items".into(),
                Value::Array(
                    items
                        .iter()
                        .map(|item| type_to_schema(item, &none, ref_prefix))
                        .collect(),
                ),
            );
            schema.insert("minItems".into(), items.len().into());
            schema.insert("additionalItems".into(), false.into());
        }
        Type::Object {
            properties,
            additional,
        } => {
            schema.insert("type".into(), "object".into());
            let mut props = Map::new();
            let mut required = Vec::new();
            for prop in properties {
                props.insert(
                    prop.name.clone(),
                    type_to_schema(&prop.ty, &prop.annotations, ref_prefix),
                );
                if prop.required {
                    required.push(Value::String(prop.name.clone()));
                }
            }
            schema.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                schema.insert("required".into(), Value::Array(required));
            }
            if !additional {
                schema.insert("additionalProperties".into(), false.into());
            }
        }
        Type::Or { members } => {
            schema.insert(
                "anyOf".into(),
                Value::Array(
                    members
                        .iter()
                        .map(|member| type_to_schema(member, &none, ref_prefix))
                        .collect(),
                ),
            );
        }
        Type::And { members } => {
            schema.insert(
                "allOf".into(),
                Value::Array(
                    members
                        .iter()
                        .map(|member| type_to_schema(member, &none, ref_prefix))
                        .collect(),
                ),
            );
        }
        Type::Ref { target } => {
            schema.insert("$ref".into(), format!("{ref_prefix}{target}").into());
        }
    }

    if let Some(title) = &annotations.title {
        schema.insert("title".into(), title.clone().into());
    }
    if let Some(description) = &annotations.description {
        schema.insert("description".into(), description.clone().into());
    }
    if let Some(default) = &annotations.default {
        schema.insert("default".into(), default.clone());
    }

    Value::Object(schema)
}

/// Serialize a document into a map of named schemas.
pub(crate) fn document_to_schemas(doc: &Document, ref_prefix: &str) -> Map<String, Value> {
    doc.types
        .iter()
        .map(|named| {
            (
                named.name.clone(),
                type_to_schema(&named.ty, &named.annotations, ref_prefix),
            )
        })
        .collect()
}

/// Rewrite every `$ref` in place from one prefix to another.
pub(crate) fn rewrite_refs(value: &mut Value, from_prefix: &str, to_prefix: &str) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if key == "$ref" {
                    if let Some(target) =
                        entry.as_str().and_then(|r| r.strip_prefix(from_prefix))
                    {
                        *entry = format!("{to_prefix}{target}").into();
                        continue;
                    }
                }
                rewrite_refs(entry, from_prefix, to_prefix);
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                rewrite_refs(entry, from_prefix, to_prefix);
            }
        }
        _ => {}
    }
}

/// Wrap named schemas in a draft-07 document.
pub(crate) fn wrap_definitions(schemas: Map<String, Value>) -> Value {
    let mut root = Map::new();
    root.insert("$schema".into(), SCHEMA_DRAFT.into());
    root.insert("definitions".into(), Value::Object(schemas));
    Value::Object(root)
}

pub fn reader() -> Reader {
    let read: ReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let schemas = definitions_of(&root)?;
        Ok(schemas_to_document(schemas, DEFINITIONS_REF, opts))
    });

    // Self edge: normalize to JSON and report the type names, leaving the
    // schemas untouched. Required for one-hop routes that terminate here.
    let to_json_schema: ShortcutReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let names: Vec<String> = definitions_of(&root)?.keys().cloned().collect();
        Ok(Conversion::complete(serde_json::to_string_pretty(&root)?, names))
    });

    // Direct translation into an Open API wrapper, keeping the raw schemas.
    let to_open_api: ShortcutReadFn = Arc::new(|data, opts| {
        let root = parse_json_or_yaml(data, opts.filename.as_deref())?;
        let mut schemas = definitions_of(&root)?.clone();
        for schema in schemas.values_mut() {
            rewrite_refs(schema, DEFINITIONS_REF, COMPONENTS_REF);
        }
        let names: Vec<String> = schemas.keys().cloned().collect();
        let wrapped = open_api::wrap_schemas(schemas, opts.filename.as_deref(), "1");
        Ok(Conversion::complete(
            serde_json::to_string_pretty(&wrapped)?,
            names,
        ))
    });

    Reader::new(Format::JsonSchema, read)
        .with_shortcut(Format::JsonSchema, to_json_schema)
        .with_shortcut(Format::OpenApi, to_open_api)
}

pub fn writer() -> Writer {
    let write: WriteFn = Arc::new(|doc, _opts| {
        let schemas = document_to_schemas(doc, DEFINITIONS_REF);
        let names = doc.type_names();
        Ok(Conversion::complete(
            serde_json::to_string_pretty(&wrap_definitions(schemas))?,
            names,
        ))
    });

    // Self edge, mirroring the reader's.
    let from_json_schema: ShortcutWriteFn = Arc::new(|data, _wopts, ropts| {
        let root = parse_json_or_yaml(data, ropts.filename.as_deref())?;
        let names: Vec<String> = definitions_of(&root)?.keys().cloned().collect();
        Ok(Conversion::complete(serde_json::to_string_pretty(&root)?, names))
    });

    let from_open_api: ShortcutWriteFn = Arc::new(|data, _wopts, ropts| {
        let root = parse_json_or_yaml(data, ropts.filename.as_deref())?;
        let mut schemas = open_api::schemas_of(&root)?.clone();
        for schema in schemas.values_mut() {
            rewrite_refs(schema, COMPONENTS_REF, DEFINITIONS_REF);
        }
        let names: Vec<String> = schemas.keys().cloned().collect();
        Ok(Conversion::complete(
            serde_json::to_string_pretty(&wrap_definitions(schemas))?,
            names,
        ))
    });

    Writer::new(Format::JsonSchema, write)
        .with_shortcut(Format::JsonSchema, from_json_schema)
        .with_shortcut(Format::OpenApi, from_open_api)
}
