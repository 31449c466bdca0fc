//! GraphQL ("gql") SDL reader and writer.
//!
//! Reads `type`, `enum`, `union` and `scalar` definitions; everything else
//! (inputs, interfaces, directives, field arguments) is outside the neutral
//! model and is skipped with a warning. The writer maps objects to `type`,
//! string-constant unions to `enum` and reference unions to `union`, with a
//! configurable policy for types that have no SDL counterpart.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{Annotations, Document, NamedType, Property, Type};
use crate::error::{Error, Location};
use crate::format::Format;
use crate::reader::{Conversion, ReadFn, Reader};
use crate::writer::{WriteFn, Writer};

/// What to do with a type SDL cannot express.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UnsupportedBehavior {
    /// Drop it silently.
    Ignore,
    /// Drop it and report through the warn callback.
    #[default]
    Warn,
    /// Fail the conversion.
    Error,
}

/// Options for the GraphQL writer.
#[derive(Debug, Clone, Default)]
pub struct GraphQlWriterOptions {
    pub unsupported: UnsupportedBehavior,
    /// Scalar name to emit for `null`; without one, nullable-only types are
    /// unsupported.
    pub null_type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Punct(char),
}

fn lex(source: &str) -> Result<Vec<(Token, Location)>, Error> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    // Consumes the character at `i`, tracking line/column.
    let advance = |i: &mut usize, line: &mut usize, column: &mut usize| {
        if chars[*i] == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
        *i += 1;
    };

    while i < chars.len() {
        let c = chars[i];
        let location = Location { line, column };

        if c.is_whitespace() || c == ',' {
            advance(&mut i, &mut line, &mut column);
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut column);
            }
            continue;
        }
        if c == '"' {
            let block = chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"');
            let mut text = String::new();
            if block {
                for _ in 0..3 {
                    advance(&mut i, &mut line, &mut column);
                }
                while i < chars.len()
                    && !(chars[i] == '"'
                        && chars.get(i + 1) == Some(&'"')
                        && chars.get(i + 2) == Some(&'"'))
                {
                    text.push(chars[i]);
                    advance(&mut i, &mut line, &mut column);
                }
                if i >= chars.len() {
                    return Err(Error::conversion_at("Unterminated block string", location));
                }
                for _ in 0..3 {
                    advance(&mut i, &mut line, &mut column);
                }
                text = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
            } else {
                advance(&mut i, &mut line, &mut column);
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        advance(&mut i, &mut line, &mut column);
                        if i >= chars.len() {
                            break;
                        }
                    }
                    text.push(chars[i]);
                    advance(&mut i, &mut line, &mut column);
                }
                if i >= chars.len() {
                    return Err(Error::conversion_at("Unterminated string", location));
                }
                advance(&mut i, &mut line, &mut column);
            }
            tokens.push((Token::Str(text), location));
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let mut text = String::new();
            while let Some(&next) = chars.get(i) {
                if next.is_alphanumeric() || next == '_' {
                    text.push(next);
                    advance(&mut i, &mut line, &mut column);
                } else {
                    break;
                }
            }
            tokens.push((Token::Ident(text), location));
            continue;
        }

        advance(&mut i, &mut line, &mut column);
        tokens.push((Token::Punct(c), location));
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [(Token, Location)],
    pos: usize,
}

struct Unsupported(String);

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
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

    fn ident(&mut self) -> Result<String, Unsupported> {
        match self.next() {
            Some(Token::Ident(text)) => Ok(text.clone()),
            _ => Err(Unsupported("expected a name".to_string())),
        }
    }

    fn description(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Str(text)) => {
                self.pos += 1;
                Some(text.clone())
            }
            _ => None,
        }
    }

    /// Skip past a failed definition: past a brace block if one opens before
    /// the next definition keyword, otherwise up to that keyword.
    fn skip_definition(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Punct('{') => {
                    let mut depth = 0usize;
                    while let Some(token) = self.next() {
                        match token {
                            Token::Punct('{') => depth += 1,
                            Token::Punct('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    return;
                                }
                            }
                            _ => {}
                        }
                    }
                    return;
                }
                Token::Ident(word) if is_definition_keyword(word) => return,
                Token::Str(_) => return,
                _ => {
                    self.pos += 1;
                }
            }
        }
    }

    /// A field type: named, list or non-null.
    fn parse_field_type(&mut self) -> Result<(Type, bool), Unsupported> {
        let ty = if self.eat_punct('[') {
            let (inner, _) = self.parse_field_type()?;
            if !self.eat_punct(']') {
                return Err(Unsupported("expected ']'".to_string()));
            }
            Type::Array {
                items: Box::new(inner),
            }
        } else {
            named_type(&self.ident()?)
        };
        let non_null = self.eat_punct('!');
        Ok((ty, non_null))
    }

    fn parse_fields(&mut self) -> Result<Vec<Property>, Unsupported> {
        if !self.eat_punct('{') {
            return Err(Unsupported("expected '{'".to_string()));
        }
        let mut fields = Vec::new();
        loop {
            if self.eat_punct('}') {
                return Ok(fields);
            }
            let description = self.description();
            let name = self.ident()?;
            if self.eat_punct('(') {
                return Err(Unsupported(format!("field '{name}' takes arguments")));
            }
            if !self.eat_punct(':') {
                return Err(Unsupported("expected ':'".to_string()));
            }
            let (ty, non_null) = self.parse_field_type()?;
            self.skip_directives();
            fields.push(Property {
                name,
                ty,
                required: non_null,
                annotations: Annotations {
                    description,
                    ..Annotations::default()
                },
            });
        }
    }

    fn skip_directives(&mut self) {
        while self.eat_punct('@') {
            let _ = self.ident();
            if self.eat_punct('(') {
                let mut depth = 1usize;
                while depth > 0 {
                    match self.next() {
                        Some(Token::Punct('(')) => depth += 1,
                        Some(Token::Punct(')')) => depth -= 1,
                        Some(_) => {}
                        None => return,
                    }
                }
            }
        }
    }
}

fn is_definition_keyword(word: &str) -> bool {
    matches!(
        word,
        "type" | "enum" | "union" | "scalar" | "input" | "interface" | "schema" | "extend"
            | "directive"
    )
}

fn named_type(name: &str) -> Type {
    match name {
        "Int" => Type::Integer,
        "Float" => Type::Number,
        "String" | "ID" => Type::String,
        "Boolean" => Type::Boolean,
        other => Type::Ref {
            target: other.to_string(),
        },
    }
}

pub fn reader() -> Reader {
    let read: ReadFn = Arc::new(|data, opts| {
        let tokens = lex(data)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };

        let mut types = Vec::new();
        let mut converted = Vec::new();
        let mut not_converted = Vec::new();

        while parser.peek().is_some() {
            let description = parser.description();

            let keyword = match parser.next() {
                Some(Token::Ident(word)) => word.clone(),
                Some(_) => continue,
                None => break,
            };

            let (name, result): (String, Result<Type, Unsupported>) = match keyword.as_str() {
                "type" => {
                    let Ok(name) = parser.ident() else {
                        parser.skip_definition();
                        continue;
                    };
                    parser.skip_directives();
                    let result = parser.parse_fields().map(|properties| Type::Object {
                        properties,
                        additional: false,
                    });
                    (name, result)
                }
                "enum" => {
                    let Ok(name) = parser.ident() else {
                        parser.skip_definition();
                        continue;
                    };
                    let result = parse_enum_values(&mut parser).map(|members| Type::Or { members });
                    (name, result)
                }
                "union" => {
                    let Ok(name) = parser.ident() else {
                        parser.skip_definition();
                        continue;
                    };
                    let result = parse_union_members(&mut parser).map(|members| Type::Or { members });
                    (name, result)
                }
                "scalar" => {
                    let Ok(name) = parser.ident() else {
                        parser.skip_definition();
                        continue;
                    };
                    parser.skip_directives();
                    (name, Ok(Type::Any))
                }
                other => {
                    if is_definition_keyword(other) {
                        (opts.warn)(&format!("Skipping unsupported '{other}' definition"), None);
                    }
                    parser.skip_definition();
                    continue;
                }
            };

            match result {
                Ok(ty) => {
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
                Err(Unsupported(reason)) => {
                    (opts.warn)(&format!("Type '{name}' not converted: {reason}"), None);
                    parser.skip_definition();
                    not_converted.push(name);
                }
            }
        }

        Ok(Conversion {
            data: Document::new(types),
            converted_types: converted,
            not_converted_types: not_converted,
        })
    });
    Reader::new(Format::GraphQl, read)
}

fn parse_enum_values(parser: &mut Parser<'_>) -> Result<Vec<Type>, Unsupported> {
    if !parser.eat_punct('{') {
        return Err(Unsupported("expected '{'".to_string()));
    }
    let mut members = Vec::new();
    loop {
        if parser.eat_punct('}') {
            return Ok(members);
        }
        let _ = parser.description();
        let value = parser.ident()?;
        parser.skip_directives();
        members.push(Type::Const {
            value: Value::String(value),
        });
    }
}

fn parse_union_members(parser: &mut Parser<'_>) -> Result<Vec<Type>, Unsupported> {
    if !parser.eat_punct('=') {
        return Err(Unsupported("expected '='".to_string()));
    }
    parser.eat_punct('|');
    let mut members = vec![named_type(&parser.ident()?)];
    while parser.eat_punct('|') {
        members.push(named_type(&parser.ident()?));
    }
    Ok(members)
}

pub fn writer(options: GraphQlWriterOptions) -> Writer {
    let write: WriteFn = Arc::new(move |doc, opts| {
        let mut out = String::new();
        let mut converted = Vec::new();
        let mut not_converted = Vec::new();
        let mut first = true;

        for named in &doc.types {
            match print_named(named, &options) {
                Ok(text) => {
                    if !first {
                        out.push('\n');
                    }
                    first = false;
                    out.push_str(&text);
                    converted.push(named.name.clone());
                }
                Err(reason) => {
                    match options.unsupported {
                        UnsupportedBehavior::Ignore => {}
                        UnsupportedBehavior::Warn => (opts.warn)(
                            &format!("Type '{}' not converted: {reason}", named.name),
                            None,
                        ),
                        UnsupportedBehavior::Error => {
                            return Err(Error::conversion(format!(
                                "Type '{}' cannot be expressed in GraphQL: {reason}",
                                named.name
                            )))
                        }
                    }
                    not_converted.push(named.name.clone());
                }
            }
        }

        Ok(Conversion {
            data: out,
            converted_types: converted,
            not_converted_types: not_converted,
        })
    });
    Writer::new(Format::GraphQl, write)
}

fn print_named(named: &NamedType, options: &GraphQlWriterOptions) -> Result<String, String> {
    let mut out = String::new();
    print_description(&mut out, "", &named.annotations);

    match &named.ty {
        Type::Object { properties, .. } => {
            let _ = writeln!(out, "type {} {{", named.name);
            for prop in properties {
                print_description(&mut out, "    ", &prop.annotations);
                let (name, nullable) = unwrap_nullable(&prop.ty);
                let bang = if prop.required && !nullable { "!" } else { "" };
                let _ = writeln!(
                    out,
                    "    {}: {}{bang}",
                    prop.name,
                    print_field_type(name, options)?
                );
            }
            let _ = writeln!(out, "}}");
        }
        Type::Or { members } if members.iter().all(is_string_const) => {
            let _ = writeln!(out, "enum {} {{", named.name);
            for member in members {
                if let Type::Const {
                    value: Value::String(value),
                } = member
                {
                    let _ = writeln!(out, "    {value}");
                }
            }
            let _ = writeln!(out, "}}");
        }
        Type::Or { members } if members.iter().all(|m| matches!(m, Type::Ref { .. })) => {
            let names: Vec<&str> = members
                .iter()
                .filter_map(|member| match member {
                    Type::Ref { target } => Some(target.as_str()),
                    _ => None,
                })
                .collect();
            let _ = writeln!(out, "union {} = {}", named.name, names.join(" | "));
        }
        _ => {
            return Err("only objects, enums and unions of references map to SDL".to_string());
        }
    }
    Ok(out)
}

fn is_string_const(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Const {
            value: Value::String(_)
        }
    )
}

/// Strip an `X | null` wrapper, reporting that the field is nullable.
fn unwrap_nullable(ty: &Type) -> (&Type, bool) {
    if let Type::Or { members } = ty {
        if members.len() == 2 {
            if let Some(other) = match (&members[0], &members[1]) {
                (Type::Null, other) | (other, Type::Null) => Some(other),
                _ => None,
            } {
                return (other, true);
            }
        }
    }
    (ty, false)
}

fn print_field_type(ty: &Type, options: &GraphQlWriterOptions) -> Result<String, String> {
    Ok(match ty {
        Type::Integer => "Int".to_string(),
        Type::Number => "Float".to_string(),
        Type::String => "String".to_string(),
        Type::Boolean => "Boolean".to_string(),
        Type::Ref { target } => target.clone(),
        Type::Array { items } => {
            let (inner, nullable) = unwrap_nullable(items);
            let bang = if nullable { "" } else { "!" };
            format!("[{}{bang}]", print_field_type(inner, options)?)
        }
        Type::Null => match &options.null_type_name {
            Some(name) => name.clone(),
            None => return Err("'null' has no scalar name configured".to_string()),
        },
        other => return Err(format!("no SDL counterpart for {other:?}")),
    })
}

fn print_description(out: &mut String, indent: &str, annotations: &Annotations) {
    let Some(description) = &annotations.description else {
        return;
    };
    let _ = writeln!(out, "{indent}\"\"\"");
    for line in description.lines() {
        let _ = writeln!(out, "{indent}{line}");
    }
    let _ = writeln!(out, "{indent}\"\"\"");
}
