//! Bi-format EPCIS document codec: XML (1.x and 2.0) and JSON-LD decoders
//! and encoders sharing one canonical `EpcisDocument` shape.
//!
//! `epcis-capture` decodes inbound documents through `xml::decode`/
//! `json::decode_document`; `epcis-query` and `epcis-api` encode result sets
//! back out through `xml::encode`/`json::encode_document`. Nothing here
//! knows about tenants, storage, or transport — see `epcis-core` for the
//! domain model this crate reads and writes.

pub mod document;
pub mod error;
pub mod field_index;
pub mod flatten;
pub mod json;
pub mod xml;
pub mod xml1;
pub mod xml2;
pub mod xml_common;
pub mod xml_tree;
pub mod xml_write;

pub use document::EpcisDocument;
pub use error::{CodecError, CodecResult};
