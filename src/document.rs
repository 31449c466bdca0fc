//! The neutral "core document" type model.
//!
//! Every reader produces a [`Document`] and every writer consumes one. The
//! model is deliberately small: it is the least common denominator all the
//! supported type systems can round-trip through, not a superset of them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete set of named types, the unit of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub types: Vec<NamedType>,
}

impl Document {
    /// Wrap a list of named types in a current-version document.
    pub fn new(types: Vec<NamedType>) -> Self {
        Self { version: 1, types }
    }

    /// Names of all types in the document, in order.
    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }
}

/// A single named type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
    #[serde(flatten)]
    pub ty: Type,
    #[serde(flatten, default)]
    pub annotations: Annotations,
}

impl NamedType {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            annotations: Annotations::default(),
        }
    }
}

/// Annotations carried alongside a type: documentation and defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<Value>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.default.is_none()
    }
}

/// A type node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Type {
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    /// A constant value (literal type).
    Const { value: Value },
    Array {
        items: Box<Type>,
    },
    Tuple {
        items: Vec<Type>,
    },
    Object {
        properties: Vec<Property>,
        /// Whether additional, undeclared properties are allowed.
        #[serde(default)]
        additional: bool,
    },
    /// Union type.
    Or { members: Vec<Type> },
    /// Intersection type.
    And { members: Vec<Type> },
    /// Reference to another named type in the same document.
    Ref { target: String },
}

/// A property of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(flatten)]
    pub ty: Type,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten, default)]
    pub annotations: Annotations,
}

impl Property {
    pub fn new(name: impl Into<String>, ty: Type, required: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            required,
            annotations: Annotations::default(),
        }
    }
}

/// Options for [`simplify`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplifyOptions {
    /// Merge intersections of object types into one self-contained object.
    /// Useful for type systems that have no intersection construct.
    pub merge_objects: bool,
}

/// Normalize a document: flatten nested unions and intersections, drop
/// duplicate members, unwrap single-member compounds. May drop annotations
/// on collapsed intermediate nodes.
pub fn simplify(mut doc: Document, options: SimplifyOptions) -> Document {
    for named in &mut doc.types {
        named.ty = simplify_type(std::mem::replace(&mut named.ty, Type::Any), options);
    }
    doc
}

fn simplify_type(ty: Type, options: SimplifyOptions) -> Type {
    match ty {
        Type::Or { members } => {
            let members = flatten_members(members, options, true);
            match members.len() {
                1 => members.into_iter().next().unwrap_or(Type::Any),
                _ => Type::Or { members },
            }
        }
        Type::And { members } => {
            let members = flatten_members(members, options, false);
            if options.merge_objects && members.iter().all(is_object) {
                return merge_objects(members);
            }
            match members.len() {
                1 => members.into_iter().next().unwrap_or(Type::Any),
                _ => Type::And { members },
            }
        }
        Type::Array { items } => Type::Array {
            items: Box::new(simplify_type(*items, options)),
        },
        Type::Tuple { items } => Type::Tuple {
            items: items
                .into_iter()
                .map(|item| simplify_type(item, options))
                .collect(),
        },
        Type::Object {
            properties,
            additional,
        } => Type::Object {
            properties: properties
                .into_iter()
                .map(|mut prop| {
                    prop.ty = simplify_type(prop.ty, options);
                    prop
                })
                .collect(),
            additional,
        },
        other => other,
    }
}

fn flatten_members(members: Vec<Type>, options: SimplifyOptions, union: bool) -> Vec<Type> {
    let mut out: Vec<Type> = Vec::with_capacity(members.len());
    for member in members {
        let member = simplify_type(member, options);
        let inner = match member {
            Type::Or { members } if union => members,
            Type::And { members } if !union => members,
            other => vec![other],
        };
        for ty in inner {
            if !out.contains(&ty) {
                out.push(ty);
            }
        }
    }
    out
}

fn is_object(ty: &Type) -> bool {
    matches!(ty, Type::Object { .. })
}

fn merge_objects(members: Vec<Type>) -> Type {
    let mut properties: Vec<Property> = Vec::new();
    let mut additional = true;
    for member in members {
        if let Type::Object {
            properties: props,
            additional: add,
        } = member
        {
            additional = additional && add;
            for prop in props {
                if let Some(existing) = properties.iter_mut().find(|p| p.name == prop.name) {
                    *existing = prop;
                } else {
                    properties.push(prop);
                }
            }
        }
    }
    Type::Object {
        properties,
        additional,
    }
}

/// Remove all annotations from a named type, recursively.
pub fn strip_annotations(mut named: NamedType) -> NamedType {
    named.annotations = Annotations::default();
    strip_type_annotations(&mut named.ty);
    named
}

fn strip_type_annotations(ty: &mut Type) {
    match ty {
        Type::Array { items } => strip_type_annotations(items),
        Type::Tuple { items } => items.iter_mut().for_each(strip_type_annotations),
        Type::Object { properties, .. } => {
            for prop in properties {
                prop.annotations = Annotations::default();
                strip_type_annotations(&mut prop.ty);
            }
        }
        Type::Or { members } | Type::And { members } => {
            members.iter_mut().for_each(strip_type_annotations);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn or(members: Vec<Type>) -> Type {
        Type::Or { members }
    }

    #[test]
    fn test_simplify_flattens_nested_unions() {
        let ty = or(vec![
            Type::String,
            or(vec![Type::Number, Type::String, or(vec![Type::Null])]),
        ]);
        let doc = simplify(
            Document::new(vec![NamedType::new("T", ty)]),
            SimplifyOptions::default(),
        );
        assert_eq!(
            doc.types[0].ty,
            or(vec![Type::String, Type::Number, Type::Null])
        );
    }

    #[test]
    fn test_simplify_unwraps_single_member() {
        let doc = simplify(
            Document::new(vec![NamedType::new("T", or(vec![Type::String, Type::String]))]),
            SimplifyOptions::default(),
        );
        assert_eq!(doc.types[0].ty, Type::String);
    }

    #[test]
    fn test_merge_objects() {
        let ty = Type::And {
            members: vec![
                Type::Object {
                    properties: vec![Property::new("a", Type::String, true)],
                    additional: true,
                },
                Type::Object {
                    properties: vec![
                        Property::new("a", Type::Number, false),
                        Property::new("b", Type::Boolean, true),
                    ],
                    additional: true,
                },
            ],
        };
        let doc = simplify(
            Document::new(vec![NamedType::new("T", ty)]),
            SimplifyOptions {
                merge_objects: true,
            },
        );
        match &doc.types[0].ty {
            Type::Object { properties, .. } => {
                assert_eq!(properties.len(), 2);
                // Later intersection member wins for the shared property.
                assert_eq!(properties[0].ty, Type::Number);
                assert!(!properties[0].required);
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_document_json_roundtrip() {
        let doc = Document::new(vec![NamedType {
            name: "User".to_string(),
            ty: Type::Object {
                properties: vec![
                    Property::new("name", Type::String, true),
                    Property::new(
                        "tags",
                        Type::Array {
                            items: Box::new(Type::String),
                        },
                        false,
                    ),
                ],
                additional: false,
            },
            annotations: Annotations {
                description: Some("A user".to_string()),
                ..Annotations::default()
            },
        }]);
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_strip_annotations() {
        let named = NamedType {
            name: "T".to_string(),
            ty: Type::Object {
                properties: vec![Property {
                    name: "a".to_string(),
                    ty: Type::String,
                    required: true,
                    annotations: Annotations {
                        title: Some("A".to_string()),
                        ..Annotations::default()
                    },
                }],
                additional: false,
            },
            annotations: Annotations {
                description: Some("doc".to_string()),
                ..Annotations::default()
            },
        };
        let stripped = strip_annotations(named);
        assert!(stripped.annotations.is_empty());
        match &stripped.ty {
            Type::Object { properties, .. } => assert!(properties[0].annotations.is_empty()),
            other => panic!("expected object, got {other:?}"),
        }
    }
}
