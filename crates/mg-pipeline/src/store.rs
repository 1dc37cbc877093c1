//! Content and style store seams.
//!
//! Object storage and style storage live outside the engine. Processors
//! only see the [`ContentStore`] and [`StyleStore`] traits; the in-memory
//! implementations here back tests and embedders that preload content.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use mg_core::{Error, Result};

/// A stored object as returned by a [`ContentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    pub bytes: Bytes,
    pub content_type: String,
    /// Headers stored alongside the object (cache-control, etag, ...).
    pub headers: BTreeMap<String, String>,
}

impl ContentObject {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Builder: attach a stored header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Source of the objects a request refers to.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch an object. Missing objects are [`Error::NotFound`].
    async fn get(&self, uri: &str) -> Result<ContentObject>;

    /// A location external tools can open directly.
    fn url(&self, uri: &str) -> Result<String>;
}

/// A stored alias for an action path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDefinition {
    pub id: String,
    /// `/`-joined action path, same grammar as a request.
    pub expansion: String,
}

/// Lookup of style definitions by name.
#[async_trait]
pub trait StyleStore: Send + Sync {
    /// Missing styles are [`Error::NotFound`].
    async fn get(&self, id: &str) -> Result<StyleDefinition>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// [`ContentStore`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<String, ContentObject>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, object: ContentObject) {
        self.objects.write().insert(uri.into(), object);
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, uri: &str) -> Result<ContentObject> {
        self.objects
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::not_found("object", uri))
    }

    fn url(&self, uri: &str) -> Result<String> {
        if self.objects.read().contains_key(uri) {
            Ok(format!("memory://{uri}"))
        } else {
            Err(Error::not_found("object", uri))
        }
    }
}

/// [`StyleStore`] backed by a map of name to expansion.
#[derive(Debug, Default)]
pub struct MemoryStyleStore {
    styles: RwLock<HashMap<String, String>>,
}

impl MemoryStyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, expansion: impl Into<String>) {
        self.styles.write().insert(id.into(), expansion.into());
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStyleStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let styles = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            styles: RwLock::new(styles),
        }
    }
}

#[async_trait]
impl StyleStore for MemoryStyleStore {
    async fn get(&self, id: &str) -> Result<StyleDefinition> {
        let expansion = self
            .styles
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("style", id))?;
        Ok(StyleDefinition {
            id: id.to_string(),
            expansion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_content_round_trip() {
        let store = MemoryContentStore::new();
        store.insert(
            "a.jpg",
            ContentObject::new(&b"jpeg"[..], "image/jpeg").with_header("cache-control", "max-age=60"),
        );

        let obj = store.get("a.jpg").await.unwrap();
        assert_eq!(obj.bytes, Bytes::from_static(b"jpeg"));
        assert_eq!(obj.headers["cache-control"], "max-age=60");
        assert_eq!(store.url("a.jpg").unwrap(), "memory://a.jpg");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryContentStore::new();
        assert!(matches!(store.get("nope").await, Err(Error::NotFound { .. })));
        assert!(matches!(store.url("nope"), Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn memory_styles() {
        let store: MemoryStyleStore = [("thumb", "image/resize,w_100")].into_iter().collect();
        let def = store.get("thumb").await.unwrap();
        assert_eq!(def.id, "thumb");
        assert_eq!(def.expansion, "image/resize,w_100");
        assert!(matches!(store.get("other").await, Err(Error::NotFound { .. })));
    }
}
