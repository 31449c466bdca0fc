use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Identifier for a supported type system.
///
/// `CoreTypes` ("ct") is the neutral intermediate format. Every registered
/// reader and writer implicitly supports it, so a route between any two
/// formats always exists once both have a neutral-route reader/writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Format {
    /// TypeScript
    #[value(name = "ts")]
    #[serde(rename = "ts")]
    Ts,
    /// JSON Schema
    #[value(name = "jsc")]
    #[serde(rename = "jsc")]
    JsonSchema,
    /// GraphQL SDL
    #[value(name = "gql")]
    #[serde(rename = "gql")]
    GraphQl,
    /// Open API
    #[value(name = "oapi")]
    #[serde(rename = "oapi")]
    OpenApi,
    /// SureType validators
    #[value(name = "st")]
    #[serde(rename = "st")]
    SureType,
    /// The neutral core document format
    #[value(name = "ct")]
    #[serde(rename = "ct")]
    CoreTypes,
}

impl Format {
    /// The short identifier used on the command line and in path keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Ts => "ts",
            Format::JsonSchema => "jsc",
            Format::GraphQl => "gql",
            Format::OpenApi => "oapi",
            Format::SureType => "st",
            Format::CoreTypes => "ct",
        }
    }

    /// Human-readable name of the type system.
    pub fn display_name(self) -> &'static str {
        match self {
            Format::Ts => "TypeScript",
            Format::JsonSchema => "JSON Schema",
            Format::GraphQl => "GraphQL",
            Format::OpenApi => "Open API",
            Format::SureType => "SureType",
            Format::CoreTypes => "core document",
        }
    }

    /// Default output filename extension when converting *to* this format.
    pub fn default_extension(self) -> &'static str {
        match self {
            Format::Ts | Format::SureType => "ts",
            Format::JsonSchema | Format::CoreTypes => "json",
            Format::GraphQl => "graphql",
            Format::OpenApi => "yaml",
        }
    }

    /// All known formats, in registration order.
    pub fn all() -> &'static [Format] {
        &[
            Format::Ts,
            Format::JsonSchema,
            Format::GraphQl,
            Format::OpenApi,
            Format::SureType,
            Format::CoreTypes,
        ]
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ts" => Ok(Format::Ts),
            "jsc" => Ok(Format::JsonSchema),
            "gql" => Ok(Format::GraphQl),
            "oapi" => Ok(Format::OpenApi),
            "st" => Ok(Format::SureType),
            "ct" => Ok(Format::CoreTypes),
            other => Err(format!("Invalid type system identifier: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_identifiers() {
        for format in Format::all() {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), *format);
        }
    }

    #[test]
    fn test_invalid_identifier() {
        assert!("typescript".parse::<Format>().is_err());
    }

    #[test]
    fn test_default_extensions() {
        assert_eq!(Format::Ts.default_extension(), "ts");
        assert_eq!(Format::GraphQl.default_extension(), "graphql");
        assert_eq!(Format::OpenApi.default_extension(), "yaml");
    }
}
