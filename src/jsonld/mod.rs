//! # JSON-LD Expansion
//!
//! Turns the compacted document of a page into statements. The cache only
//! depends on the [`Expander`] trait; [`JsonLdExpander`] is the bundled
//! implementation.

pub mod context;
pub mod expander;

pub use context::{Container, Context, TermDefinition, TypeMapping};
pub use expander::JsonLdExpander;

use crate::error::Result;
use crate::graph::Triple;
use serde_json::Value;

/// Expansion of a compacted document into statements
///
/// Called off the async executor (on a blocking thread), once per page.
/// `base` is the page URI used to resolve relative IRIs.
pub trait Expander: Send + Sync {
    fn expand(&self, document: &Value, base: &str) -> Result<Vec<Triple>>;
}
