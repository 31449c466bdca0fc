//! SureType ("st") reader and writer.
//!
//! The writer emits TypeScript source built on the suretype validator
//! builders (`v.object`, `v.string`, ...), one exported schema per type plus
//! optional inferred-type, ensurer and type-guard exports. The reader parses
//! that same builder subset back. Reading requires the file itself (imports
//! and variable names carry meaning), so the reader is managed and receives
//! a path instead of source text.
//!
//! Both sides also shortcut via JSON Schema, which suretype validators are a
//! thin syntax over.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{Annotations, Document, NamedType, Property, Type};
use crate::error::Error;
use crate::format::Format;
use crate::formats::json_schema::{
    definitions_of, document_to_schemas, parse_json_or_yaml, schemas_to_document, wrap_definitions,
    DEFINITIONS_REF,
};
use crate::formats::typescript::{lex, Lexed, Token};
use crate::reader::{Conversion, ReadFn, Reader, ReaderOptions, ShortcutReadFn};
use crate::writer::{ShortcutWriteFn, WriteFn, Writer, WriterOptions};

/// Options for the SureType writer.
#[derive(Debug, Clone)]
pub struct SureTypeWriterOptions {
    /// Export `type X = TypeOf<typeof schemaX>` aliases.
    pub export_type: bool,
    /// Export `ensureX` functions (validate-or-throw).
    pub export_ensurer: bool,
    /// Export `isX` type guards.
    pub export_type_guard: bool,
}

impl Default for SureTypeWriterOptions {
    fn default() -> Self {
        Self {
            export_type: true,
            export_ensurer: true,
            export_type_guard: true,
        }
    }
}

fn schema_var(name: &str) -> String {
    format!("schema{name}")
}

pub fn writer(options: SureTypeWriterOptions) -> Writer {
    let write_options = options.clone();
    let write: WriteFn =
        Arc::new(move |doc, opts| write_document(doc, opts, &write_options));

    let shortcut_options = options;
    let from_json_schema: ShortcutWriteFn = Arc::new(move |data, wopts, ropts| {
        let root = parse_json_or_yaml(data, ropts.filename.as_deref())?;
        let conversion = schemas_to_document(definitions_of(&root)?, DEFINITIONS_REF, ropts);
        let mut written = write_document(&conversion.data, wopts, &shortcut_options)?;
        for name in conversion.not_converted_types {
            if !written.not_converted_types.contains(&name) {
                written.not_converted_types.push(name);
            }
        }
        Ok(written)
    });

    Writer::new(Format::SureType, write).with_shortcut(Format::JsonSchema, from_json_schema)
}

fn write_document(
    doc: &Document,
    opts: &WriterOptions,
    options: &SureTypeWriterOptions,
) -> Result<Conversion<String>, Error> {
    let mut body = String::new();
    let mut converted = Vec::new();
    let mut not_converted = Vec::new();

    for named in &doc.types {
        match print_validator(&named.ty, 1) {
            Ok(validator) => {
                body.push('\n');
                if let Some(description) = &named.annotations.description {
                    let _ = writeln!(body, "/**");
                    for line in description.lines() {
                        let _ = writeln!(body, " * {line}");
                    }
                    let _ = writeln!(body, " */");
                }
                let var = schema_var(&named.name);
                let _ = writeln!(body, "export const {var} = suretype(");
                let _ = writeln!(body, "    {{ name: {:?} }},", named.name);
                let _ = writeln!(body, "    {validator}");
                let _ = writeln!(body, ");");

                if options.export_type {
                    let _ = writeln!(
                        body,
                        "\nexport type {} = TypeOf<typeof {var}>;",
                        named.name
                    );
                }
                if options.export_ensurer {
                    let _ = writeln!(
                        body,
                        "\nexport const ensure{} = compile({var}, {{ ensure: true }});",
                        named.name
                    );
                }
                if options.export_type_guard {
                    let _ = writeln!(
                        body,
                        "\nexport const is{} = compile<typeof {var}, {}>({var}, {{ simple: true }});",
                        named.name, named.name
                    );
                }
                converted.push(named.name.clone());
            }
            Err(reason) => {
                (opts.warn)(
                    &format!("Type '{}' not converted: {reason}", named.name),
                    None,
                );
                not_converted.push(named.name.clone());
            }
        }
    }

    let mut out = String::new();
    let mut imports = vec!["suretype", "v"];
    if options.export_ensurer || options.export_type_guard {
        imports.push("compile");
    }
    let _ = writeln!(out, "import {{ {} }} from \"suretype\";", imports.join(", "));
    if options.export_type {
        let _ = writeln!(out, "import type {{ TypeOf }} from \"suretype\";");
    }
    out.push_str(&body);

    Ok(Conversion {
        data: out,
        converted_types: converted,
        not_converted_types: not_converted,
    })
}

fn print_validator(ty: &Type, depth: usize) -> Result<String, String> {
    let indent = "    ".repeat(depth);
    Ok(match ty {
        Type::Any => "v.any()".to_string(),
        Type::Null => "v.null()".to_string(),
        Type::Boolean => "v.boolean()".to_string(),
        Type::Integer => "v.number().integer()".to_string(),
        Type::Number => "v.number()".to_string(),
        Type::String => "v.string()".to_string(),
        Type::Const { value } => match value {
            Value::String(_) => format!("v.string().const({value})"),
            Value::Number(_) => format!("v.number().const({value})"),
            Value::Bool(_) => format!("v.boolean().const({value})"),
            Value::Null => "v.null()".to_string(),
            other => return Err(format!("unsupported literal {other}")),
        },
        Type::Array { items } => format!("v.array({})", print_validator(items, depth)?),
        Type::Tuple { .. } => return Err("tuples have no validator builder".to_string()),
        Type::Object { properties, .. } => {
            let mut out = String::new();
            let _ = writeln!(out, "v.object({{");
            for prop in properties {
                let required = if prop.required { ".required()" } else { "" };
                let _ = writeln!(
                    out,
                    "{indent}    {}: {}{required},",
                    prop.name,
                    print_validator(&prop.ty, depth + 1)?
                );
            }
            let _ = write!(out, "{indent}}})");
            out
        }
        Type::Or { members } => compound("anyOf", members, depth)?,
        Type::And { members } => compound("allOf", members, depth)?,
        Type::Ref { target } => schema_var(target),
    })
}

fn compound(method: &str, members: &[Type], depth: usize) -> Result<String, String> {
    let members = members
        .iter()
        .map(|member| print_validator(member, depth))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("v.{method}([{}])", members.join(", ")))
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
}

struct Unsupported(String);

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos).map(|l| &l.token);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if let Some(Token::Ident(text)) = self.peek() {
            if text == word {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_punct(&mut self, c: char) -> Result<(), Unsupported> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(Unsupported(format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> Result<String, Unsupported> {
        match self.next() {
            Some(Token::Ident(text)) => Ok(text.clone()),
            _ => Err(Unsupported("expected an identifier".to_string())),
        }
    }

    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            match token {
                Token::Punct('{') | Token::Punct('(') | Token::Punct('[') => depth += 1,
                Token::Punct('}') | Token::Punct(')') | Token::Punct(']') => {
                    depth = depth.saturating_sub(1)
                }
                Token::Punct(';') if depth == 0 => return,
                _ => {}
            }
        }
    }

    /// A builder expression: `v.method(args)` with chained modifiers, or a
    /// reference to another schema variable.
    fn parse_validator(&mut self) -> Result<(Type, bool), Unsupported> {
        let head = self.ident()?;
        if head != "v" {
            // Reference to a schema declared elsewhere in the file.
            let target = head
                .strip_prefix("schema")
                .unwrap_or(head.as_str())
                .to_string();
            return self.parse_modifiers(Type::Ref { target });
        }

        self.expect_punct('.')?;
        let method = self.ident()?;
        self.expect_punct('(')?;

        let ty = match method.as_str() {
            "any" | "unknown" => {
                self.expect_punct(')')?;
                Type::Any
            }
            "null" => {
                self.expect_punct(')')?;
                Type::Null
            }
            "boolean" => {
                self.expect_punct(')')?;
                Type::Boolean
            }
            "number" => {
                self.expect_punct(')')?;
                Type::Number
            }
            "string" => {
                self.expect_punct(')')?;
                Type::String
            }
            "array" => {
                if self.eat_punct(')') {
                    Type::Array {
                        items: Box::new(Type::Any),
                    }
                } else {
                    let (items, _) = self.parse_validator()?;
                    self.expect_punct(')')?;
                    Type::Array {
                        items: Box::new(items),
                    }
                }
            }
            "object" => {
                self.expect_punct('{')?;
                let mut properties = Vec::new();
                loop {
                    if self.eat_punct('}') {
                        break;
                    }
                    let name = match self.next() {
                        Some(Token::Ident(text)) | Some(Token::Str(text)) => text.clone(),
                        _ => return Err(Unsupported("expected a property name".to_string())),
                    };
                    self.expect_punct(':')?;
                    let (ty, required) = self.parse_validator()?;
                    properties.push(Property {
                        name,
                        ty,
                        required,
                        annotations: Annotations::default(),
                    });
                    self.eat_punct(',');
                }
                self.expect_punct(')')?;
                return Ok(self.parse_modifiers(Type::Object {
                    properties,
                    additional: false,
                })?);
            }
            "anyOf" | "allOf" => {
                self.expect_punct('[')?;
                let mut members = Vec::new();
                loop {
                    if self.eat_punct(']') {
                        break;
                    }
                    let (member, _) = self.parse_validator()?;
                    members.push(member);
                    self.eat_punct(',');
                }
                self.expect_punct(')')?;
                let ty = if method == "anyOf" {
                    Type::Or { members }
                } else {
                    Type::And { members }
                };
                return Ok(self.parse_modifiers(ty)?);
            }
            other => return Err(Unsupported(format!("unknown builder 'v.{other}'"))),
        };

        self.parse_modifiers(ty)
    }

    /// Chained calls after a builder: `.required()`, `.integer()`,
    /// `.const(...)`. Unknown modifiers fail the declaration.
    fn parse_modifiers(&mut self, mut ty: Type) -> Result<(Type, bool), Unsupported> {
        let mut required = false;
        while self.eat_punct('.') {
            let method = self.ident()?;
            self.expect_punct('(')?;
            match method.as_str() {
                "required" => {
                    self.expect_punct(')')?;
                    required = true;
                }
                "integer" => {
                    self.expect_punct(')')?;
                    ty = Type::Integer;
                }
                "const" => {
                    let value = self.parse_literal()?;
                    self.expect_punct(')')?;
                    ty = Type::Const { value };
                }
                other => return Err(Unsupported(format!("unknown modifier '.{other}()'"))),
            }
        }
        Ok((ty, required))
    }

    fn parse_literal(&mut self) -> Result<Value, Unsupported> {
        match self.next() {
            Some(Token::Str(text)) => Ok(Value::String(text.clone())),
            Some(Token::Num(value)) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .ok_or_else(|| Unsupported("non-finite number literal".to_string())),
            Some(Token::Ident(word)) if word == "true" => Ok(Value::Bool(true)),
            Some(Token::Ident(word)) if word == "false" => Ok(Value::Bool(false)),
            Some(Token::Ident(word)) if word == "null" => Ok(Value::Null),
            _ => Err(Unsupported("expected a literal".to_string())),
        }
    }

    /// The metadata object of `suretype({ name: "X" }, ...)`; returns the
    /// declared name, skipping other keys.
    fn parse_meta_name(&mut self) -> Result<Option<String>, Unsupported> {
        self.expect_punct('{')?;
        let mut name = None;
        loop {
            if self.eat_punct('}') {
                return Ok(name);
            }
            let key = match self.next() {
                Some(Token::Ident(text)) | Some(Token::Str(text)) => text.clone(),
                _ => return Err(Unsupported("expected a metadata key".to_string())),
            };
            self.expect_punct(':')?;
            match self.next() {
                Some(Token::Str(text)) if key == "name" => name = Some(text.clone()),
                Some(Token::Str(_)) | Some(Token::Num(_)) | Some(Token::Ident(_)) => {}
                _ => return Err(Unsupported("expected a metadata value".to_string())),
            }
            self.eat_punct(',');
        }
    }
}

fn parse_source(data: &str, opts: &ReaderOptions) -> Result<Conversion<Document>, Error> {
    let tokens = lex(data)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };

    let mut types = Vec::new();
    let mut converted = Vec::new();
    let mut not_converted = Vec::new();

    while parser.peek().is_some() {
        let description = match parser.peek() {
            Some(Token::Doc(text)) => {
                parser.pos += 1;
                Some(text.clone())
            }
            _ => None,
        };
        parser.eat_ident("export");
        if !parser.eat_ident("const") {
            // Imports, type aliases, compile() exports.
            parser.skip_statement();
            continue;
        }
        let Ok(var) = parser.ident() else {
            parser.skip_statement();
            continue;
        };
        if parser.expect_punct('=').is_err() {
            parser.skip_statement();
            continue;
        }

        let fallback_name = var.strip_prefix("schema").unwrap_or(&var).to_string();
        let result = parse_schema_expr(&mut parser);
        match result {
            Ok((meta_name, ty)) => {
                let name = meta_name.unwrap_or(fallback_name);
                parser.eat_punct(';');
                types.push(NamedType {
                    name: name.clone(),
                    ty,
                    annotations: Annotations {
                        description,
                        ..Annotations::default()
                    },
                });
                converted.push(name);
            }
            Err(Skip) => {
                parser.skip_statement();
            }
            Err(Reject(reason)) => {
                (opts.warn)(
                    &format!("Type '{fallback_name}' not converted: {reason}"),
                    None,
                );
                parser.skip_statement();
                not_converted.push(fallback_name);
            }
        }
    }

    Ok(Conversion {
        data: Document::new(types),
        converted_types: converted,
        not_converted_types: not_converted,
    })
}

use SchemaExprError::{Reject, Skip};

enum SchemaExprError {
    /// Not a schema declaration at all (ensurers, guards, unrelated consts).
    Skip,
    /// A schema declaration using something outside the supported subset.
    Reject(String),
}

fn parse_schema_expr(
    parser: &mut Parser<'_>,
) -> Result<(Option<String>, Type), SchemaExprError> {
    if parser.eat_ident("suretype") {
        parser.expect_punct('(').map_err(|_| Skip)?;
        let name = parser.parse_meta_name().map_err(|e| Reject(e.0))?;
        parser.eat_punct(',');
        let (ty, _) = parser.parse_validator().map_err(|e| Reject(e.0))?;
        parser.expect_punct(')').map_err(|e| Reject(e.0))?;
        return Ok((name, ty));
    }
    // A bare `v.*` expression declares an anonymous schema named after the
    // variable.
    if parser.peek() == Some(&Token::Ident("v".to_string())) {
        let (ty, _) = parser.parse_validator().map_err(|e| Reject(e.0))?;
        return Ok((None, ty));
    }
    Err(Skip)
}

pub fn reader() -> Reader {
    let read: ReadFn = Arc::new(|path, opts| {
        let data = std::fs::read_to_string(path)?;
        parse_source(&data, opts)
    });

    let to_json_schema: ShortcutReadFn = Arc::new(|path, opts| {
        let data = std::fs::read_to_string(path)?;
        let conversion = parse_source(&data, opts)?;
        let schemas = document_to_schemas(&conversion.data, DEFINITIONS_REF);
        Ok(Conversion {
            data: serde_json::to_string_pretty(&wrap_definitions(schemas))?,
            converted_types: conversion.converted_types,
            not_converted_types: conversion.not_converted_types,
        })
    });

    Reader::new(Format::SureType, read)
        .managed()
        .with_shortcut(Format::JsonSchema, to_json_schema)
}
