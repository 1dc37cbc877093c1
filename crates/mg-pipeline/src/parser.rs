//! Request parsing: raw path and query to a [`PipelineRequest`].

use mg_core::config::ParserConfig;
use mg_core::{Error, Result};

use crate::style::STYLE_PROCESSOR;
use crate::token::split_action_path;

/// Marks a style reference in the path (`photo.jpg!thumb`).
const STYLE_DELIMITER: char = '!';
/// Optional marker in front of the style delimiter (`photo.jpg@!thumb`).
const STYLE_PREFIX: char = '@';
const MAX_STYLE_NAME: usize = 63;

/// A parsed request: which object, and which actions to run on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub uri: String,
    /// Processor name followed by action tokens. Empty means passthrough.
    pub tokens: Vec<String>,
}

impl PipelineRequest {
    pub fn new(uri: impl Into<String>, tokens: Vec<String>) -> Self {
        Self {
            uri: uri.into(),
            tokens,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Name of the target processor, if any.
    pub fn processor(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn is_style(&self) -> bool {
        self.processor() == Some(STYLE_PROCESSOR)
    }
}

fn is_valid_style_name(name: &str) -> bool {
    (1..=MAX_STYLE_NAME).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Turns request paths and queries into [`PipelineRequest`]s.
#[derive(Debug, Clone)]
pub struct RequestActionParser {
    query_key: String,
}

impl Default for RequestActionParser {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

impl RequestActionParser {
    pub fn new(query_key: impl Into<String>) -> Self {
        Self {
            query_key: query_key.into(),
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.query_key.clone())
    }

    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    /// Parse an already-decoded path and query pairs.
    ///
    /// A style reference in the path takes precedence over the query.
    pub fn parse<'q, I>(&self, path: &str, query: I) -> Result<PipelineRequest>
    where
        I: IntoIterator<Item = (&'q str, &'q str)>,
    {
        let path = path.strip_prefix('/').unwrap_or(path);

        if let Some(at) = path.find(STYLE_DELIMITER) {
            let style = &path[at + STYLE_DELIMITER.len_utf8()..];
            let resource = &path[..at];
            let resource = resource.strip_suffix(STYLE_PREFIX).unwrap_or(resource);
            if !is_valid_style_name(style) {
                return Err(Error::invalid(format!("invalid style name: {style:?}")));
            }
            if resource.is_empty() {
                return Err(Error::invalid("empty resource path"));
            }
            return Ok(PipelineRequest::new(
                resource,
                vec![STYLE_PROCESSOR.to_string(), style.to_string()],
            ));
        }

        if path.is_empty() {
            return Err(Error::invalid("empty resource path"));
        }

        let tokens = query
            .into_iter()
            .find(|(k, _)| *k == self.query_key)
            .map(|(_, v)| split_action_path(v))
            .unwrap_or_default();
        Ok(PipelineRequest::new(path, tokens))
    }

    /// Parse a raw `path?query` string, percent-decoding both parts.
    pub fn parse_url(&self, path_and_query: &str) -> Result<PipelineRequest> {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let path = percent_decode(path)?;

        let pairs = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                Ok((percent_decode(k)?, percent_decode(v)?))
            })
            .collect::<Result<Vec<(String, String)>>>()?;

        self.parse(&path, pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Decode `%XX` escapes and `+`.
fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::invalid(format!("malformed percent escape in {s:?}")))?;
                out.push(hex);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| Error::invalid(format!("request is not utf-8: {s:?}")))
}
