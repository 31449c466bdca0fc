//! TypeScript ("ts") reader and writer.
//!
//! The reader is a small hand-written lexer and recursive-descent parser for
//! the declaration subset that maps onto the neutral document: `interface`
//! and `type` declarations built from primitives, literals, arrays, tuples,
//! inline objects, unions, intersections and references. Declarations using
//! anything beyond that (generics, mapped types, `extends`, ...) are skipped
//! with a warning instead of failing the whole file.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{Annotations, Document, NamedType, Property, Type};
use crate::error::{Error, ErrorMeta, Location};
use crate::format::Format;
use crate::reader::{Conversion, ReadFn, Reader};
use crate::writer::{WriteFn, Writer};

/// Options for the TypeScript writer.
#[derive(Debug, Clone, Default)]
pub struct TypeScriptWriterOptions {
    /// Emit `declare` declarations (for `.d.ts` output).
    pub declare: bool,
    /// Print `unknown` instead of `any` for the top type.
    pub use_unknown: bool,
    /// Skip the generated-file header comment.
    pub no_descriptive_header: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Punct(char),
    Doc(String),
}

pub(crate) struct Lexed {
    pub(crate) token: Token,
    pub(crate) location: Location,
}

/// Tokenize TypeScript-ish source. Also used by the SureType reader, whose
/// input is the same lexical language.
pub(crate) fn lex(source: &str) -> Result<Vec<Lexed>, Error> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
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

        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut column);
            continue;
        }

        // Comments. A `/** */` block becomes a doc token for descriptions.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut column);
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let doc = chars.get(i + 2) == Some(&'*') && chars.get(i + 3) != Some(&'/');
            let start = i;
            advance(&mut i, &mut line, &mut column);
            advance(&mut i, &mut line, &mut column);
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                advance(&mut i, &mut line, &mut column);
            }
            if i >= chars.len() {
                return Err(Error::conversion_at("Unterminated comment", location));
            }
            advance(&mut i, &mut line, &mut column);
            advance(&mut i, &mut line, &mut column);
            if doc {
                let raw: String = chars[start + 3..i - 2].iter().collect();
                tokens.push(Lexed {
                    token: Token::Doc(clean_doc(&raw)),
                    location,
                });
            }
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            let quote = c;
            advance(&mut i, &mut line, &mut column);
            let mut text = String::new();
            loop {
                let Some(&next) = chars.get(i) else {
                    return Err(Error::conversion_at("Unterminated string", location));
                };
                if next == quote {
                    advance(&mut i, &mut line, &mut column);
                    break;
                }
                if next == '\\' {
                    advance(&mut i, &mut line, &mut column);
                    let Some(&escaped) = chars.get(i) else {
                        return Err(Error::conversion_at("Unterminated string", location));
                    };
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                    advance(&mut i, &mut line, &mut column);
                    continue;
                }
                text.push(next);
                advance(&mut i, &mut line, &mut column);
            }
            tokens.push(Lexed {
                token: Token::Str(text),
                location,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut text = String::new();
            while let Some(&next) = chars.get(i) {
                if next.is_ascii_digit() || next == '.' {
                    text.push(next);
                    advance(&mut i, &mut line, &mut column);
                } else {
                    break;
                }
            }
            let value: f64 = text
                .parse()
                .map_err(|_| Error::conversion_at(format!("Invalid number '{text}'"), location))?;
            tokens.push(Lexed {
                token: Token::Num(value),
                location,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let mut text = String::new();
            while let Some(&next) = chars.get(i) {
                if next.is_alphanumeric() || next == '_' || next == '$' {
                    text.push(next);
                    advance(&mut i, &mut line, &mut column);
                } else {
                    break;
                }
            }
            tokens.push(Lexed {
                token: Token::Ident(text),
                location,
            });
            continue;
        }

        advance(&mut i, &mut line, &mut column);
        tokens.push(Lexed {
            token: Token::Punct(c),
            location,
        });
    }

    Ok(tokens)
}

fn clean_doc(raw: &str) -> String {
    raw.lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
}

/// A declaration-level failure: the declaration is skipped with a warning
/// rather than aborting the file.
struct Unsupported(String);

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|l| l.location)
            .unwrap_or(Location { line: 1, column: 1 })
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

    /// Skip a failed declaration: consume until a `;` or the end of a brace
    /// block at nesting depth zero.
    fn skip_declaration(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            match token {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                Token::Punct(';') if depth == 0 => return,
                _ => {}
            }
        }
    }

    fn parse_type_expr(&mut self) -> Result<Type, Unsupported> {
        // Leading `|` is allowed on multi-line unions.
        self.eat_punct('|');
        let mut members = vec![self.parse_intersection()?];
        while self.eat_punct('|') {
            members.push(self.parse_intersection()?);
        }
        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            Type::Or { members }
        })
    }

    fn parse_intersection(&mut self) -> Result<Type, Unsupported> {
        let mut members = vec![self.parse_postfix()?];
        while self.eat_punct('&') {
            members.push(self.parse_postfix()?);
        }
        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            Type::And { members }
        })
    }

    fn parse_postfix(&mut self) -> Result<Type, Unsupported> {
        let mut ty = self.parse_primary()?;
        while self.peek() == Some(&Token::Punct('[')) {
            // Only `[]` suffixes; indexed access is out of scope.
            self.pos += 1;
            self.expect_punct(']')?;
            ty = Type::Array {
                items: Box::new(ty),
            };
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<Type, Unsupported> {
        match self.next() {
            Some(Token::Ident(name)) => self.parse_named(name),
            Some(Token::Str(text)) => Ok(Type::Const {
                value: Value::String(text.clone()),
            }),
            Some(Token::Num(value)) => Ok(Type::Const {
                value: serde_json::Number::from_f64(*value)
                    .map(Value::Number)
                    .ok_or_else(|| Unsupported("non-finite number literal".to_string()))?,
            }),
            Some(Token::Punct('{')) => {
                let properties = self.parse_members()?;
                Ok(Type::Object {
                    properties,
                    additional: false,
                })
            }
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                if !self.eat_punct(']') {
                    loop {
                        items.push(self.parse_type_expr()?);
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                    self.expect_punct(']')?;
                }
                Ok(Type::Tuple { items })
            }
            Some(Token::Punct('(')) => {
                let ty = self.parse_type_expr()?;
                self.expect_punct(')')?;
                Ok(ty)
            }
            other => Err(Unsupported(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_named(&mut self, name: &str) -> Result<Type, Unsupported> {
        let ty = match name {
            "string" => Type::String,
            "number" => Type::Number,
            "boolean" => Type::Boolean,
            "null" | "undefined" => Type::Null,
            "any" | "unknown" => Type::Any,
            "object" => Type::Object {
                properties: vec![],
                additional: true,
            },
            "true" => Type::Const { value: true.into() },
            "false" => Type::Const {
                value: false.into(),
            },
            "Array" => {
                self.expect_punct('<')?;
                let items = self.parse_type_expr()?;
                self.expect_punct('>')?;
                return Ok(Type::Array {
                    items: Box::new(items),
                });
            }
            other => {
                if self.peek() == Some(&Token::Punct('<')) {
                    return Err(Unsupported(format!("generic type '{other}<...>'")));
                }
                return Ok(Type::Ref {
                    target: other.to_string(),
                });
            }
        };
        Ok(ty)
    }

    fn parse_members(&mut self) -> Result<Vec<Property>, Unsupported> {
        let mut properties = Vec::new();
        loop {
            if self.eat_punct('}') {
                return Ok(properties);
            }
            let description = match self.peek() {
                Some(Token::Doc(text)) => {
                    self.pos += 1;
                    Some(text.clone())
                }
                _ => None,
            };
            self.eat_ident("readonly");
            let name = match self.next() {
                Some(Token::Ident(text)) | Some(Token::Str(text)) => text.clone(),
                _ => return Err(Unsupported("expected a property name".to_string())),
            };
            let required = !self.eat_punct('?');
            self.expect_punct(':')?;
            let ty = self.parse_type_expr()?;
            properties.push(Property {
                name,
                ty,
                required,
                annotations: Annotations {
                    description,
                    ..Annotations::default()
                },
            });
            if !self.eat_punct(';') {
                self.eat_punct(',');
            }
        }
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
            let description = match parser.peek() {
                Some(Token::Doc(text)) => {
                    parser.pos += 1;
                    Some(text.clone())
                }
                _ => None,
            };
            let location = parser.location();
            parser.eat_ident("export");
            parser.eat_ident("declare");

            let (name, result) = if parser.eat_ident("interface") {
                let name = match parser.ident() {
                    Ok(name) => name,
                    Err(_) => {
                        parser.skip_declaration();
                        continue;
                    }
                };
                let result = parse_interface_body(&mut parser);
                (name, result)
            } else if parser.eat_ident("type") {
                let name = match parser.ident() {
                    Ok(name) => name,
                    Err(_) => {
                        parser.skip_declaration();
                        continue;
                    }
                };
                let result = parser
                    .expect_punct('=')
                    .and_then(|()| parser.parse_type_expr())
                    .map(|ty| {
                        parser.eat_punct(';');
                        ty
                    });
                (name, result)
            } else {
                // Imports and other statements are not type definitions.
                parser.skip_declaration();
                continue;
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
                    let meta = ErrorMeta {
                        location: Some(location),
                        ..ErrorMeta::default()
                    };
                    (opts.warn)(
                        &format!("Type '{name}' not converted: {reason}"),
                        Some(&meta),
                    );
                    parser.skip_declaration();
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
    Reader::new(Format::Ts, read)
}

fn parse_interface_body(parser: &mut Parser<'_>) -> Result<Type, Unsupported> {
    if parser.eat_ident("extends") {
        return Err(Unsupported("interface inheritance".to_string()));
    }
    if parser.peek() == Some(&Token::Punct('<')) {
        return Err(Unsupported("generic type parameters".to_string()));
    }
    parser.expect_punct('{')?;
    let properties = parser.parse_members()?;
    Ok(Type::Object {
        properties,
        additional: false,
    })
}

pub fn writer(options: TypeScriptWriterOptions) -> Writer {
    let write: WriteFn = Arc::new(move |doc, opts| {
        let mut out = String::new();
        if !options.no_descriptive_header {
            let _ = writeln!(out, "/*");
            let _ = writeln!(out, " * Auto-generated type definitions. Edits will be lost.");
            if let Some(source) = &opts.source_filename {
                let _ = writeln!(out, " *");
                let _ = writeln!(out, " * Source: {source}");
            }
            let _ = writeln!(out, " */");
            out.push('\n');
        }

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
                    (opts.warn)(
                        &format!("Type '{}' not converted: {reason}", named.name),
                        None,
                    );
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
    Writer::new(Format::Ts, write)
}

fn print_named(named: &NamedType, options: &TypeScriptWriterOptions) -> Result<String, String> {
    let mut out = String::new();
    print_doc(&mut out, "", &named.annotations);

    let declare = if options.declare { "declare " } else { "" };
    match &named.ty {
        Type::Object {
            properties,
            additional,
        } => {
            let _ = writeln!(out, "export {declare}interface {} {{", named.name);
            for prop in properties {
                print_doc(&mut out, "    ", &prop.annotations);
                let optional = if prop.required { "" } else { "?" };
                let _ = writeln!(
                    out,
                    "    {}{optional}: {};",
                    quote_property(&prop.name),
                    print_type(&prop.ty, options, false)?
                );
            }
            if *additional {
                let top = if options.use_unknown { "unknown" } else { "any" };
                let _ = writeln!(out, "    [key: string]: {top};");
            }
            let _ = writeln!(out, "}}");
        }
        other => {
            let _ = writeln!(
                out,
                "export {declare}type {} = {};",
                named.name,
                print_type(other, options, false)?
            );
        }
    }
    Ok(out)
}

fn print_doc(out: &mut String, indent: &str, annotations: &Annotations) {
    let Some(description) = &annotations.description else {
        return;
    };
    let _ = writeln!(out, "{indent}/**");
    for line in description.lines() {
        let _ = writeln!(out, "{indent} * {line}");
    }
    let _ = writeln!(out, "{indent} */");
}

fn quote_property(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain {
        name.to_string()
    } else {
        format!("{:?}", name)
    }
}

fn print_type(
    ty: &Type,
    options: &TypeScriptWriterOptions,
    parenthesize: bool,
) -> Result<String, String> {
    let text = match ty {
        Type::Any => if options.use_unknown { "unknown" } else { "any" }.to_string(),
        Type::Null => "null".to_string(),
        Type::Boolean => "boolean".to_string(),
        Type::Integer | Type::Number => "number".to_string(),
        Type::String => "string".to_string(),
        Type::Const { value } => match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => value.to_string(),
            other => return Err(format!("unsupported literal {other}")),
        },
        Type::Array { items } => format!("{}[]", print_type(items, options, true)?),
        Type::Tuple { items } => {
            let items = items
                .iter()
                .map(|item| print_type(item, options, false))
                .collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", items.join(", "))
        }
        Type::Object { properties, .. } => {
            let props = properties
                .iter()
                .map(|prop| {
                    let optional = if prop.required { "" } else { "?" };
                    Ok(format!(
                        "{}{optional}: {}",
                        quote_property(&prop.name),
                        print_type(&prop.ty, options, false)?
                    ))
                })
                .collect::<Result<Vec<_>, String>>()?;
            format!("{{ {} }}", props.join("; "))
        }
        Type::Or { members } => {
            let members = members
                .iter()
                .map(|member| print_type(member, options, true))
                .collect::<Result<Vec<_>, _>>()?;
            let joined = members.join(" | ");
            return Ok(if parenthesize {
                format!("({joined})")
            } else {
                joined
            });
        }
        Type::And { members } => {
            let members = members
                .iter()
                .map(|member| print_type(member, options, true))
                .collect::<Result<Vec<_>, _>>()?;
            let joined = members.join(" & ");
            return Ok(if parenthesize {
                format!("({joined})")
            } else {
                joined
            });
        }
        Type::Ref { target } => target.clone(),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReaderOptions;
    use crate::writer::WriterOptions;

    fn read(source: &str) -> Conversion<Document> {
        reader().read(source, &ReaderOptions::default()).unwrap()
    }

    #[test]
    fn test_reads_interface() {
        let conversion = read(
            r#"
            /** A user */
            export interface User {
                name: string;
                age?: number;
                tags: string[];
            }
            "#,
        );
        assert_eq!(conversion.converted_types, vec!["User"]);
        let user = &conversion.data.types[0];
        assert_eq!(user.annotations.description.as_deref(), Some("A user"));
        match &user.ty {
            Type::Object { properties, .. } => {
                assert_eq!(properties.len(), 3);
                assert!(properties[0].required);
                assert!(!properties[1].required);
                assert_eq!(
                    properties[2].ty,
                    Type::Array {
                        items: Box::new(Type::String)
                    }
                );
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_reads_type_aliases() {
        let conversion = read(
            r#"
            export type Id = string | number;
            export type Pair = [string, User];
            export type Status = "on" | "off";
            "#,
        );
        assert_eq!(conversion.converted_types, vec!["Id", "Pair", "Status"]);
        assert_eq!(
            conversion.data.types[0].ty,
            Type::Or {
                members: vec![Type::String, Type::Number]
            }
        );
        assert_eq!(
            conversion.data.types[1].ty,
            Type::Tuple {
                items: vec![
                    Type::String,
                    Type::Ref {
                        target: "User".to_string()
                    }
                ]
            }
        );
    }

    #[test]
    fn test_lexer_tracks_locations_across_lines() {
        let tokens = lex("type A = {\n    // note\n    b: string;\n}").unwrap();
        let b = tokens
            .iter()
            .find(|t| t.token == Token::Ident("b".to_string()))
            .unwrap();
        assert_eq!(b.location, Location { line: 3, column: 5 });
    }

    #[test]
    fn test_unsupported_declaration_warns_with_location() {
        use std::sync::{Arc, Mutex};

        let locations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&locations);
        let opts = ReaderOptions {
            warn: Arc::new(move |_: &str, meta: Option<&ErrorMeta>| {
                sink.lock().unwrap().push(meta.and_then(|m| m.location));
            }),
            ..ReaderOptions::default()
        };

        let source = "\n\nexport type Bad = Map<string, number>;\n";
        let conversion = reader().read(source, &opts).unwrap();
        assert_eq!(conversion.not_converted_types, vec!["Bad"]);
        assert_eq!(
            *locations.lock().unwrap(),
            vec![Some(Location { line: 3, column: 1 })]
        );
    }

    #[test]
    fn test_unsupported_declaration_is_skipped_with_warning() {
        let conversion = read(
            r#"
            export type Bad = Map<string, number>;
            export type Good = string;
            "#,
        );
        assert_eq!(conversion.not_converted_types, vec!["Bad"]);
        assert_eq!(conversion.converted_types, vec!["Good"]);
    }

    #[test]
    fn test_imports_are_ignored() {
        let conversion = read(
            r#"
            import { Foo } from "./foo";
            export type T = Foo;
            "#,
        );
        assert_eq!(conversion.converted_types, vec!["T"]);
    }

    #[test]
    fn test_writer_prints_interface() {
        let doc = Document::new(vec![NamedType::new(
            "User",
            Type::Object {
                properties: vec![
                    Property::new("name", Type::String, true),
                    Property::new(
                        "age",
                        Type::Or {
                            members: vec![Type::Number, Type::Null],
                        },
                        false,
                    ),
                ],
                additional: false,
            },
        )]);
        let out = writer(TypeScriptWriterOptions {
            no_descriptive_header: true,
            ..TypeScriptWriterOptions::default()
        })
        .write(&doc, &WriterOptions::default())
        .unwrap();
        assert_eq!(
            out.data,
            "export interface User {\n    name: string;\n    age?: number | null;\n}\n"
        );
    }

    #[test]
    fn test_writer_header_names_source() {
        let doc = Document::new(vec![NamedType::new("T", Type::String)]);
        let opts = WriterOptions {
            source_filename: Some("models/user.json".to_string()),
            ..WriterOptions::default()
        };
        let out = writer(TypeScriptWriterOptions::default())
            .write(&doc, &opts)
            .unwrap();
        assert!(out.data.starts_with("/*\n"));
        assert!(out.data.contains("Source: models/user.json"));
    }

    #[test]
    fn test_writer_roundtrips_reader_output() {
        let source = r#"
            export interface User {
                name: string;
                tags: string[];
                status: Status;
            }
            export type Status = "on" | "off";
        "#;
        let doc = read(source).data;
        let out = writer(TypeScriptWriterOptions {
            no_descriptive_header: true,
            ..TypeScriptWriterOptions::default()
        })
        .write(&doc, &WriterOptions::default())
        .unwrap();
        let back = read(&out.data);
        assert_eq!(back.data, doc);
    }

    #[test]
    fn test_use_unknown() {
        let doc = Document::new(vec![NamedType::new("T", Type::Any)]);
        let out = writer(TypeScriptWriterOptions {
            use_unknown: true,
            no_descriptive_header: true,
            ..TypeScriptWriterOptions::default()
        })
        .write(&doc, &WriterOptions::default())
        .unwrap();
        assert_eq!(out.data, "export type T = unknown;\n");
    }
}
