//! Built-in format implementations.
//!
//! Shortcut topology: the JSON Schema and Open API formats shortcut into each
//! other in both directions (they share the same schema dialect), and each
//! also declares a shortcut to its own format. Path search never takes a
//! self-loop hop, so those self edges exist to make one-hop cross-format
//! routes discoverable, such as `jsc->{jsc}->oapi`. The SureType format
//! shortcuts via JSON Schema on both sides. TypeScript and GraphQL only know
//! the neutral route.

pub mod core_types;
pub mod graphql;
pub mod json_schema;
pub mod open_api;
pub mod suretype;
pub mod typescript;

use std::sync::Arc;

use crate::graph::FormatGraph;

/// Register every built-in format with default options.
pub fn register_defaults(graph: &mut FormatGraph) {
    graph.register_reader(Arc::new(core_types::reader()));
    graph.register_writer(Arc::new(core_types::writer()));

    graph.register_reader(Arc::new(json_schema::reader()));
    graph.register_writer(Arc::new(json_schema::writer()));

    graph.register_reader(Arc::new(open_api::reader()));
    graph.register_writer(Arc::new(open_api::writer(Default::default())));

    graph.register_reader(Arc::new(typescript::reader()));
    graph.register_writer(Arc::new(typescript::writer(Default::default())));

    graph.register_reader(Arc::new(graphql::reader()));
    graph.register_writer(Arc::new(graphql::writer(Default::default())));

    graph.register_reader(Arc::new(suretype::reader()));
    graph.register_writer(Arc::new(suretype::writer(Default::default())));
}
