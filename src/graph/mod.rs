//! # Statement Graph
//!
//! The in-memory triple model the cache merges pages into:
//!
//! - [`Node`]: closed IRI / literal / blank-node term
//! - [`Triple`]: structural-equality statement with page provenance
//! - [`Graph`]: de-duplicating set with subject index and describe closure

pub mod store;
pub mod triple;

pub use store::Graph;
pub use triple::{Node, Triple, RDF_TYPE, XSD_BOOLEAN, XSD_DOUBLE, XSD_INTEGER, XSD_STRING};
