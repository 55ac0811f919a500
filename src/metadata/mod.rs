//! Metadata module
//!
//! EDMX `$metadata` parsing and schema flattening

pub mod parser;

pub use parser::{EntityType, FlatRow, MetadataDocument, MetadataError, PropertyDescriptor};
