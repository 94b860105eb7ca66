//! Nodes and statements
//!
//! A [`Triple`] compares and hashes on subject, predicate and object only.
//! The provenance it carries (the JSON object it was expanded from and the
//! key of the page that produced it) is lookup-only metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// `rdf:type`
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// A term in a statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Node {
    /// Absolute IRI
    Iri(String),

    /// Literal value with an optional language tag or datatype IRI.
    /// `xsd:string` literals are stored without a datatype.
    Literal {
        value: String,
        language: Option<String>,
        datatype: Option<String>,
    },

    /// Blank node, label stored with its `_:` prefix
    Blank(String),
}

impl Node {
    pub fn iri(value: impl Into<String>) -> Self {
        Node::Iri(value.into())
    }

    /// Plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Node::Literal {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Language-tagged string, tag stored lowercase
    pub fn lang_literal(value: impl Into<String>, language: &str) -> Self {
        Node::Literal {
            value: value.into(),
            language: Some(language.to_ascii_lowercase()),
            datatype: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Node::Literal {
            value: value.into(),
            language: None,
            datatype: (datatype != XSD_STRING).then_some(datatype),
        }
    }

    /// Create a blank node, adding the `_:` prefix when missing
    pub fn blank(label: impl Into<String>) -> Self {
        let label = label.into();
        if label.starts_with("_:") {
            Node::Blank(label)
        } else {
            Node::Blank(format!("_:{}", label))
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Node::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal { .. })
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank(_))
    }

    /// The raw value: IRI string, literal text, or `_:label`
    pub fn value(&self) -> &str {
        match self {
            Node::Iri(v) | Node::Literal { value: v, .. } | Node::Blank(v) => v,
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            Node::Literal { language, .. } => language.as_deref(),
            _ => None,
        }
    }

    pub fn datatype(&self) -> Option<&str> {
        match self {
            Node::Literal { datatype, .. } => datatype.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(iri) => write!(f, "<{}>", iri),
            Node::Blank(label) => write!(f, "{}", label),
            Node::Literal {
                value,
                language,
                datatype,
            } => {
                f.write_str("\"")?;
                for c in value.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")?;
                if let Some(language) = language {
                    write!(f, "@{}", language)?;
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{}>", datatype)?;
                }
                Ok(())
            }
        }
    }
}

/// An immutable (subject, predicate, object) statement
#[derive(Debug, Clone)]
pub struct Triple {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,

    /// JSON node object this statement was expanded from
    source: Option<Arc<Value>>,

    /// Key of the page that produced this statement. Not an owning link:
    /// the page may already be gone from the cache.
    page: Option<Arc<str>>,
}

impl Triple {
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
            source: None,
            page: None,
        }
    }

    /// Attach the JSON object the statement came from
    pub fn with_source(mut self, source: Arc<Value>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the key of the owning page
    pub fn with_page(mut self, page: Arc<str>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn source(&self) -> Option<&Arc<Value>> {
        self.source.as_ref()
    }

    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
    }
}

impl Eq for Triple {}

impl Hash for Triple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.predicate.hash(state);
        self.object.hash(state);
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}
