//! Active context for compacted JSON-LD documents
//!
//! Supports `@base`, `@vocab`, a default `@language`, keyword aliases,
//! simple and expanded term definitions (`@id`, `@reverse`, `@type`,
//! `@container`, `@language`) and compact IRIs (`prefix:suffix`). Remote
//! contexts are not dereferenced.

use crate::error::{CacheError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;
use url::Url;

/// Limit for term -> term -> IRI chains
const MAX_TERM_DEPTH: usize = 8;

/// How string values of a term are interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMapping {
    /// `"@type": "@id"`, document-relative IRIs
    Id,

    /// `"@type": "@vocab"`, terms and vocabulary-relative IRIs first
    Vocab,

    /// Typed literal; the datatype is kept as written and expanded on use
    Datatype(String),
}

/// Container mapping of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    List,
    Set,
    Language,
    Index,
}

/// A single term mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDefinition {
    /// Mapped IRI, possibly a compact IRI, another term or a keyword.
    /// `None` when the term is explicitly unmapped (`"@id": null`).
    pub iri: Option<String>,

    /// Statements run from the value to the node (`@reverse`)
    pub reverse: bool,

    pub type_mapping: Option<TypeMapping>,

    pub container: Option<Container>,

    /// Term-level language override; `Some(None)` clears the default
    pub language: Option<Option<String>>,
}

impl TermDefinition {
    fn simple(iri: impl Into<String>) -> Self {
        Self {
            iri: Some(iri.into()),
            reverse: false,
            type_mapping: None,
            container: None,
            language: None,
        }
    }
}

/// The active context while walking a document
#[derive(Debug, Clone, Default)]
pub struct Context {
    base: Option<Url>,
    vocab: Option<String>,
    language: Option<String>,
    terms: HashMap<String, TermDefinition>,
}

impl Context {
    /// Create an empty context resolving relative IRIs against `base`
    pub fn new(base: Option<Url>) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Apply a local `@context` value on top of this context
    pub fn extend(&self, local: &Value) -> Result<Context> {
        match local {
            Value::Null => Ok(Context::new(self.base.clone())),
            Value::Object(map) => self.extend_with_object(map),
            Value::Array(items) => {
                let mut ctx = self.clone();
                for item in items {
                    ctx = ctx.extend(item)?;
                }
                Ok(ctx)
            }
            Value::String(remote) => {
                warn!("Ignoring remote JSON-LD context: {}", remote);
                Ok(self.clone())
            }
            other => Err(CacheError::Expansion(format!(
                "invalid @context value: {}",
                other
            ))),
        }
    }

    fn extend_with_object(&self, map: &Map<String, Value>) -> Result<Context> {
        let mut ctx = self.clone();

        for (key, value) in map {
            match key.as_str() {
                "@base" => match value {
                    Value::String(base) => ctx.base = Some(ctx.resolve(base)?),
                    Value::Null => ctx.base = None,
                    _ => return Err(CacheError::Expansion("@base must be a string".into())),
                },
                "@vocab" => match value {
                    Value::String(vocab) => {
                        let expanded = ctx.expand_vocab(vocab, 0).unwrap_or_else(|| vocab.clone());
                        ctx.vocab = Some(expanded);
                    }
                    Value::Null => ctx.vocab = None,
                    _ => return Err(CacheError::Expansion("@vocab must be a string".into())),
                },
                "@language" => match value {
                    Value::String(language) => ctx.language = Some(language.to_ascii_lowercase()),
                    Value::Null => ctx.language = None,
                    _ => return Err(CacheError::Expansion("@language must be a string".into())),
                },
                k if k.starts_with('@') => {}
                term => match value {
                    Value::Null => {
                        ctx.terms.remove(term);
                    }
                    Value::String(iri) => {
                        ctx.terms.insert(term.to_string(), TermDefinition::simple(iri.clone()));
                    }
                    Value::Object(def) => {
                        let def = Self::term_definition(term, def)?;
                        ctx.terms.insert(term.to_string(), def);
                    }
                    _ => {
                        return Err(CacheError::Expansion(format!(
                            "invalid definition for term '{}'",
                            term
                        )))
                    }
                },
            }
        }

        Ok(ctx)
    }

    fn term_definition(term: &str, def: &Map<String, Value>) -> Result<TermDefinition> {
        let invalid = |what: &str| {
            CacheError::Expansion(format!("invalid {} in definition of term '{}'", what, term))
        };

        let (iri, reverse) = match (def.get("@reverse"), def.get("@id")) {
            (Some(Value::String(iri)), _) => (Some(iri.clone()), true),
            (Some(_), _) => return Err(invalid("@reverse")),
            (None, Some(Value::String(iri))) => (Some(iri.clone()), false),
            (None, Some(Value::Null)) => (None, false),
            (None, Some(_)) => return Err(invalid("@id")),
            (None, None) => (Some(term.to_string()), false),
        };

        let type_mapping = match def.get("@type") {
            None => None,
            Some(Value::String(t)) => Some(match t.as_str() {
                "@id" => TypeMapping::Id,
                "@vocab" => TypeMapping::Vocab,
                datatype => TypeMapping::Datatype(datatype.to_string()),
            }),
            Some(_) => return Err(invalid("@type")),
        };

        let container = match def.get("@container") {
            None | Some(Value::Null) => None,
            Some(Value::String(c)) => container_of(c),
            // ["@set", "@index"] and friends; the non-@set entry wins
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(container_of)
                .max_by_key(|c| *c != Container::Set),
            Some(_) => return Err(invalid("@container")),
        };

        let language = match def.get("@language") {
            None => None,
            Some(Value::String(language)) => Some(Some(language.to_ascii_lowercase())),
            Some(Value::Null) => Some(None),
            Some(_) => return Err(invalid("@language")),
        };

        Ok(TermDefinition {
            iri,
            reverse,
            type_mapping,
            container,
            language,
        })
    }

    pub fn term(&self, key: &str) -> Option<&TermDefinition> {
        self.terms.get(key)
    }

    /// The keyword `key` stands for, directly or through an alias
    pub fn keyword<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if key.starts_with('@') {
            return Some(key);
        }
        match self.terms.get(key) {
            Some(TermDefinition {
                iri: Some(iri),
                reverse: false,
                ..
            }) if iri.starts_with('@') => Some(iri.as_str()),
            _ => None,
        }
    }

    pub fn type_mapping(&self, key: &str) -> Option<&TypeMapping> {
        self.terms.get(key).and_then(|t| t.type_mapping.as_ref())
    }

    pub fn container(&self, key: &str) -> Option<Container> {
        self.terms.get(key).and_then(|t| t.container)
    }

    pub fn is_reverse(&self, key: &str) -> bool {
        self.terms.get(key).map(|t| t.reverse).unwrap_or(false)
    }

    /// Language for plain string values of `key`
    pub fn language_for(&self, key: &str) -> Option<&str> {
        match self.terms.get(key).and_then(|t| t.language.as_ref()) {
            Some(language) => language.as_deref(),
            None => self.language.as_deref(),
        }
    }

    /// Expand a property name to an absolute IRI, or `None` if unmapped
    pub fn expand_property(&self, key: &str) -> Option<String> {
        if key.starts_with("_:") || self.keyword(key).is_some() {
            return None;
        }
        self.expand_vocab(key, 0)
    }

    /// Expand an `@type` value
    pub fn expand_type(&self, value: &str) -> Option<String> {
        self.expand_vocab(value, 0)
            .or_else(|| self.resolve(value).ok().map(String::from))
    }

    /// Expand a string value of a `"@type": "@vocab"` term
    pub fn expand_vocab_value(&self, value: &str) -> Result<String> {
        if value.starts_with("_:") {
            return Ok(value.to_string());
        }
        match self.expand_vocab(value, 0) {
            Some(iri) => Ok(iri),
            None => self.expand_id(value),
        }
    }

    /// Expand an `@id` value (document-relative). Blank labels pass through.
    pub fn expand_id(&self, value: &str) -> Result<String> {
        if value.starts_with("_:") {
            return Ok(value.to_string());
        }

        if let Some((prefix, suffix)) = value.split_once(':') {
            if !suffix.starts_with("//") {
                if let Some(iri) = self.terms.get(prefix).and_then(|t| t.iri.as_deref()) {
                    if let Some(expanded) = self.expand_vocab(iri, 1) {
                        return Ok(format!("{}{}", expanded, suffix));
                    }
                }
            }
        }

        Ok(self.resolve(value)?.into())
    }

    fn resolve(&self, value: &str) -> Result<Url> {
        match Url::parse(value) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base.join(value).map_err(|e| CacheError::InvalidUri {
                    uri: value.to_string(),
                    reason: e.to_string(),
                }),
                None => Err(CacheError::Expansion(format!(
                    "relative IRI '{}' with no base",
                    value
                ))),
            },
            Err(e) => Err(CacheError::InvalidUri {
                uri: value.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn expand_vocab(&self, value: &str, depth: usize) -> Option<String> {
        if depth > MAX_TERM_DEPTH || value.starts_with('@') {
            return None;
        }

        if let Some(def) = self.terms.get(value) {
            match def.iri.as_deref() {
                None => return None,
                Some(iri) if iri != value => return self.expand_vocab(iri, depth + 1),
                Some(_) => {}
            }
        }

        if let Some((prefix, suffix)) = value.split_once(':') {
            if suffix.starts_with("//") {
                return Some(value.to_string());
            }
            if let Some(iri) = self.terms.get(prefix).and_then(|t| t.iri.as_deref()) {
                return self
                    .expand_vocab(iri, depth + 1)
                    .map(|expanded| format!("{}{}", expanded, suffix));
            }
            // urn:, mailto: and friends
            return Some(value.to_string());
        }

        self.vocab.as_ref().map(|vocab| format!("{}{}", vocab, value))
    }
}

fn container_of(keyword: &str) -> Option<Container> {
    match keyword {
        "@list" => Some(Container::List),
        "@set" => Some(Container::Set),
        "@language" => Some(Container::Language),
        "@index" => Some(Container::Index),
        other => {
            warn!("Unsupported container mapping: {}", other);
            None
        }
    }
}
