//! # CoRE Link Format Parser
//!
//! Parses the link-format payload (RFC 6690) a device returns to a
//! Bootstrap-Discover request, e.g.
//!
//! ```text
//! </>;lwm2m=1.1,</0>;ver=1.1,</0/0>,</0/1>;ssid=101,</1/0>;ssid=101,</3/0>
//! ```

use std::collections::BTreeMap;
use std::fmt;

use shared::{
    error::{BootstrapError, BootstrapResult},
    types::LwM2mPath,
};

/// One link of a link-format document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Target URI reference (e.g. "/0/1")
    pub uri_reference: String,

    /// Link parameters; `None` for flag parameters without a value
    pub params: BTreeMap<String, Option<String>>,
}

impl Link {
    /// Create a link without parameters
    pub fn new(uri_reference: impl Into<String>) -> Self {
        Self {
            uri_reference: uri_reference.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter (builder style)
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), Some(value.into()));
        self
    }

    /// Unquoted value of a parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|value| value.as_deref())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Interpret the target as an LWM2M path
    pub fn path(&self) -> BootstrapResult<LwM2mPath> {
        self.uri_reference.parse()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri_reference)?;
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

/// Parse a link-format document into its links
pub fn parse_links(content: &str) -> BootstrapResult<Vec<Link>> {
    split_outside_quotes(content, ',')?
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_link)
        .collect()
}

fn parse_link(part: &str) -> BootstrapResult<Link> {
    let rest = part
        .strip_prefix('<')
        .ok_or_else(|| BootstrapError::InvalidLink(format!("'{}' does not start with '<'", part)))?;
    let end = rest
        .find('>')
        .ok_or_else(|| BootstrapError::InvalidLink(format!("'{}' has no closing '>'", part)))?;

    let mut link = Link::new(&rest[..end]);
    let attributes = &rest[end + 1..];

    if attributes.is_empty() {
        return Ok(link);
    }

    let attributes = attributes.strip_prefix(';').ok_or_else(|| {
        BootstrapError::InvalidLink(format!("'{}' has text after the target", part))
    })?;

    for attribute in split_outside_quotes(attributes, ';')? {
        let attribute = attribute.trim();
        if attribute.is_empty() {
            continue;
        }
        match attribute.split_once('=') {
            Some((name, value)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(BootstrapError::InvalidLink(format!(
                        "'{}' has an unnamed parameter",
                        part
                    )));
                }
                link.params.insert(name.to_string(), Some(unquote(value.trim())));
            }
            None => {
                link.params.insert(attribute.to_string(), None);
            }
        }
    }

    Ok(link)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Split on a separator, ignoring separators inside quoted strings
fn split_outside_quotes(content: &str, separator: char) -> BootstrapResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (index, ch) in content.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == separator && !in_quotes {
            parts.push(&content[start..index]);
            start = index + ch.len_utf8();
        }
    }

    if in_quotes {
        return Err(BootstrapError::InvalidLink(format!(
            "unterminated quoted value in '{}'",
            content
        )));
    }

    parts.push(&content[start..]);
    Ok(parts)
}
