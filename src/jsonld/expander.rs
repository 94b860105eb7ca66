//! Compacted JSON-LD to triples
//!
//! Every node object yields statements whose source is that object, so a
//! subject can later be answered with the JSON it was described by.

use crate::error::{CacheError, Result};
use crate::graph::{Node, Triple, RDF_TYPE, XSD_BOOLEAN, XSD_DOUBLE, XSD_INTEGER};
use crate::jsonld::context::{Container, Context, TypeMapping};
use crate::jsonld::Expander;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Expander for the compacted JSON-LD subset served by paged metadata feeds
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdExpander;

impl JsonLdExpander {
    pub fn new() -> Self {
        Self
    }
}

impl Expander for JsonLdExpander {
    fn expand(&self, document: &Value, base: &str) -> Result<Vec<Triple>> {
        let base = Url::parse(base).map_err(|e| CacheError::InvalidUri {
            uri: base.to_string(),
            reason: e.to_string(),
        })?;

        let mut run = Expansion::new();
        let ctx = Context::new(Some(base));

        match document {
            Value::Object(_) => {
                run.node(document, &ctx)?;
            }
            Value::Array(items) => {
                for item in items {
                    run.node(item, &ctx)?;
                }
            }
            _ => {
                return Err(CacheError::Expansion(
                    "document must be a JSON object or array".to_string(),
                ))
            }
        }

        Ok(run.triples)
    }
}

/// State for one document walk
struct Expansion {
    /// Keeps blank labels from different documents apart
    scope: String,
    next_blank: usize,
    blank_labels: HashMap<String, Node>,
    triples: Vec<Triple>,
}

impl Expansion {
    fn new() -> Self {
        Self {
            scope: Uuid::new_v4().simple().to_string(),
            next_blank: 0,
            blank_labels: HashMap::new(),
            triples: Vec::new(),
        }
    }

    fn fresh_blank(&mut self) -> Node {
        let node = Node::blank(format!("{}-b{}", self.scope, self.next_blank));
        self.next_blank += 1;
        node
    }

    /// Map an expanded `@id` to a node, scoping document blank labels
    fn id_node(&mut self, id: String) -> Node {
        if !id.starts_with("_:") {
            return Node::Iri(id);
        }
        if let Some(node) = self.blank_labels.get(&id) {
            return node.clone();
        }
        let node = Node::blank(format!("{}-{}", self.scope, &id[2..]));
        self.blank_labels.insert(id, node.clone());
        node
    }

    fn node(&mut self, value: &Value, parent: &Context) -> Result<Node> {
        let map = value.as_object().ok_or_else(|| {
            CacheError::Expansion(format!("expected a node object, found {}", value))
        })?;

        let ctx = match map.get("@context") {
            Some(local) => parent.extend(local)?,
            None => parent.clone(),
        };

        let subject = match keyword_value(map, &ctx, "@id") {
            Some(Value::String(id)) => {
                let id = ctx.expand_id(id)?;
                self.id_node(id)
            }
            Some(other) => {
                return Err(CacheError::Expansion(format!(
                    "@id must be a string, found {}",
                    other
                )))
            }
            None => self.fresh_blank(),
        };

        let source = Arc::new(value.clone());
        self.properties(&subject, map, &ctx, &source)?;

        if let Some(graph) = keyword_value(map, &ctx, "@graph") {
            for member in flatten(graph, &ctx) {
                self.node(member, &ctx)?;
            }
        }

        Ok(subject)
    }

    fn properties(
        &mut self,
        subject: &Node,
        map: &Map<String, Value>,
        ctx: &Context,
        source: &Arc<Value>,
    ) -> Result<()> {
        for (key, value) in map {
            match ctx.keyword(key) {
                None => self.property(subject, key, value, ctx, source, false)?,
                Some("@type") => {
                    for ty in flatten(value, ctx).into_iter().filter_map(Value::as_str) {
                        if let Some(iri) = ctx.expand_type(ty) {
                            self.push(subject, RDF_TYPE.to_string(), Node::Iri(iri), source);
                        }
                    }
                }
                Some("@reverse") => {
                    let reversed = value.as_object().ok_or_else(|| {
                        CacheError::Expansion(format!("@reverse must be an object, found {}", value))
                    })?;
                    for (key, value) in reversed {
                        self.property(subject, key, value, ctx, source, true)?;
                    }
                }
                Some("@nest") => {
                    for nested in flatten(value, ctx) {
                        let nested = nested.as_object().ok_or_else(|| {
                            CacheError::Expansion(format!("@nest must hold objects, found {}", nested))
                        })?;
                        self.properties(subject, nested, ctx, source)?;
                    }
                }
                Some("@included") => {
                    for member in flatten(value, ctx) {
                        self.node(member, ctx)?;
                    }
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Emit the statements of one property. `flip` is set for entries of an
    /// `@reverse` map; a reverse term inside one points forward again.
    fn property(
        &mut self,
        subject: &Node,
        key: &str,
        value: &Value,
        ctx: &Context,
        source: &Arc<Value>,
        flip: bool,
    ) -> Result<()> {
        let Some(predicate) = ctx.expand_property(key) else {
            return Ok(());
        };

        let reverse = ctx.is_reverse(key) != flip;
        for (object, item) in self.objects(key, value, ctx)? {
            if !reverse {
                self.push(subject, predicate.clone(), object, source);
            } else if object.is_literal() {
                debug!("Dropping literal value of reverse property {}", predicate);
            } else {
                let mut triple = Triple::new(object, Node::Iri(predicate.clone()), subject.clone());
                if item.is_object() {
                    triple = triple.with_source(Arc::new(item.clone()));
                }
                self.triples.push(triple);
            }
        }
        Ok(())
    }

    /// Object nodes of a property value, each paired with the JSON it came from
    fn objects<'v>(
        &mut self,
        key: &str,
        value: &'v Value,
        ctx: &Context,
    ) -> Result<Vec<(Node, &'v Value)>> {
        let mut out = Vec::new();

        match (ctx.container(key), value) {
            (Some(Container::Language), Value::Object(map)) => {
                for (language, strings) in map {
                    let untagged = ctx.keyword(language) == Some("@none");
                    for item in flatten(strings, ctx) {
                        match item {
                            Value::Null => {}
                            Value::String(s) if untagged => out.push((Node::literal(s.as_str()), item)),
                            Value::String(s) => out.push((Node::lang_literal(s.as_str(), language), item)),
                            other => {
                                return Err(CacheError::Expansion(format!(
                                    "language map values must be strings, found {}",
                                    other
                                )))
                            }
                        }
                    }
                }
            }
            (Some(Container::Index), Value::Object(map)) => {
                for members in map.values() {
                    for item in flatten(members, ctx) {
                        if let Some(node) = self.value_node(key, item, ctx)? {
                            out.push((node, item));
                        }
                    }
                }
            }
            _ => {
                for item in flatten(value, ctx) {
                    if let Some(node) = self.value_node(key, item, ctx)? {
                        out.push((node, item));
                    }
                }
            }
        }

        Ok(out)
    }

    fn value_node(&mut self, key: &str, item: &Value, ctx: &Context) -> Result<Option<Node>> {
        let node = match item {
            Value::Null => return Ok(None),
            Value::String(s) => match ctx.type_mapping(key) {
                Some(TypeMapping::Id) => {
                    let id = ctx.expand_id(s)?;
                    self.id_node(id)
                }
                Some(TypeMapping::Vocab) => {
                    let id = ctx.expand_vocab_value(s)?;
                    self.id_node(id)
                }
                Some(TypeMapping::Datatype(datatype)) => {
                    Node::typed_literal(s.as_str(), datatype_iri(ctx, datatype)?)
                }
                None => match ctx.language_for(key) {
                    Some(language) => Node::lang_literal(s.as_str(), language),
                    None => Node::literal(s.as_str()),
                },
            },
            Value::Number(_) | Value::Bool(_) => match ctx.type_mapping(key) {
                Some(TypeMapping::Datatype(datatype)) => {
                    Node::typed_literal(item.to_string(), datatype_iri(ctx, datatype)?)
                }
                _ => native_literal(item),
            },
            Value::Object(map) => match keyword_value(map, ctx, "@value") {
                Some(value) => return value_object(value, map, ctx),
                None => self.node(item, ctx)?,
            },
            // flatten() never yields arrays
            Value::Array(_) => return Ok(None),
        };
        Ok(Some(node))
    }

    fn push(&mut self, subject: &Node, predicate: String, object: Node, source: &Arc<Value>) {
        self.triples.push(
            Triple::new(subject.clone(), Node::Iri(predicate), object)
                .with_source(Arc::clone(source)),
        );
    }
}

/// Literal for a `{"@value": ...}` object
fn value_object(value: &Value, map: &Map<String, Value>, ctx: &Context) -> Result<Option<Node>> {
    let datatype = match keyword_value(map, ctx, "@type") {
        Some(Value::String(datatype)) => Some(datatype_iri(ctx, datatype)?),
        Some(other) => {
            return Err(CacheError::Expansion(format!(
                "value object @type must be a string, found {}",
                other
            )))
        }
        None => None,
    };
    let language = keyword_value(map, ctx, "@language").and_then(Value::as_str);

    let node = match (value, datatype) {
        (Value::Null, _) => return Ok(None),
        (Value::String(s), Some(datatype)) => Node::typed_literal(s.as_str(), datatype),
        (Value::String(s), None) => match language {
            Some(language) => Node::lang_literal(s.as_str(), language),
            None => Node::literal(s.as_str()),
        },
        (Value::Number(_) | Value::Bool(_), Some(datatype)) => {
            Node::typed_literal(value.to_string(), datatype)
        }
        (Value::Number(_) | Value::Bool(_), None) => native_literal(value),
        (other, _) => {
            return Err(CacheError::Expansion(format!("invalid @value: {}", other)))
        }
    };
    Ok(Some(node))
}

fn datatype_iri(ctx: &Context, datatype: &str) -> Result<String> {
    ctx.expand_type(datatype).ok_or_else(|| {
        CacheError::Expansion(format!("cannot expand datatype '{}'", datatype))
    })
}

/// `xsd:boolean`, `xsd:integer` or `xsd:double` literal for a JSON scalar.
/// Numbers with a fractional part or of 1e21 and above are doubles.
fn native_literal(value: &Value) -> Node {
    match value {
        Value::Bool(b) => Node::typed_literal(b.to_string(), XSD_BOOLEAN),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() != 0.0 || f.abs() >= 1e21 => {
                Node::typed_literal(canonical_double(f), XSD_DOUBLE)
            }
            Some(f) => Node::typed_literal(format!("{:.0}", f), XSD_INTEGER),
            None => Node::typed_literal(n.to_string(), XSD_DOUBLE),
        },
        Value::Number(n) => Node::typed_literal(n.to_string(), XSD_INTEGER),
        other => Node::literal(other.to_string()),
    }
}

/// `1.5E0`, `1.0E21`
fn canonical_double(f: f64) -> String {
    let formatted = format!("{:E}", f);
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{}.0E{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// The value of `keyword` in `map`, looked up through aliases
fn keyword_value<'v>(map: &'v Map<String, Value>, ctx: &Context, keyword: &str) -> Option<&'v Value> {
    map.iter()
        .find(|(key, _)| ctx.keyword(key) == Some(keyword))
        .map(|(_, value)| value)
}

/// Members of arrays and `@list` / `@set` objects
fn flatten<'v>(value: &'v Value, ctx: &Context) -> Vec<&'v Value> {
    let mut out = Vec::new();
    collect_members(value, ctx, &mut out);
    out
}

fn collect_members<'v>(value: &'v Value, ctx: &Context, out: &mut Vec<&'v Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_members(item, ctx, out);
            }
        }
        Value::Object(map) => {
            match keyword_value(map, ctx, "@list").or_else(|| keyword_value(map, ctx, "@set")) {
                Some(inner) => collect_members(inner, ctx, out),
                None => out.push(value),
            }
        }
        other => out.push(other),
    }
}
