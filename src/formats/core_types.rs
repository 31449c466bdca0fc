//! Reader and writer for the neutral document format itself, serialized as
//! JSON. Useful for debugging routes and as a stable interchange format.

use std::sync::Arc;

use crate::document::Document;
use crate::format::Format;
use crate::reader::{Conversion, ReadFn, Reader};
use crate::writer::{WriteFn, Writer};

pub fn reader() -> Reader {
    let read: ReadFn = Arc::new(|data, _opts| {
        let doc: Document = serde_json::from_str(data)?;
        let names = doc.type_names();
        Ok(Conversion::complete(doc, names))
    });
    Reader::new(Format::CoreTypes, read)
}

pub fn writer() -> Writer {
    let write: WriteFn = Arc::new(|doc, _opts| {
        let names = doc.type_names();
        Ok(Conversion::complete(serde_json::to_string_pretty(doc)?, names))
    });
    Writer::new(Format::CoreTypes, write)
}
