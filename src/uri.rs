//! IRI canonicalization helpers

use crate::error::{CacheError, Result};
use url::Url;

fn parse(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| CacheError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}

/// Parse and re-serialize an absolute IRI
pub fn canonical_uri(uri: &str) -> Result<String> {
    Ok(parse(uri)?.into())
}

/// Strip the fragment, yielding the key of the page that holds `uri`
pub fn uri_without_fragment(uri: &str) -> Result<String> {
    let mut url = parse(uri)?;
    url.set_fragment(None);
    Ok(url.into())
}

/// True when `uri` carries a fragment, including an empty one (`http://x/#`)
pub fn has_fragment(uri: &str) -> Result<bool> {
    Ok(parse(uri)?.fragment().is_some())
}
