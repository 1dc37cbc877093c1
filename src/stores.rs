//! Local collaborators for the CLI: a directory-backed content store and a
//! JSON file of styles.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mg_core::{Error, ImageFormat, Result, VideoContainer};
use mg_pipeline::store::{ContentObject, ContentStore, StyleDefinition, StyleStore};

// ---------------------------------------------------------------------------
// LocalContentStore
// ---------------------------------------------------------------------------

/// Objects are files below `root`; the URI is the relative path.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `uri` to a path inside the root. Escaping the root is rejected.
    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let relative = Path::new(uri);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if uri.is_empty() || !contained {
            return Err(Error::invalid(format!("object key outside store: {uri:?}")));
        }
        Ok(self.root.join(relative))
    }
}

/// Content type from a file extension.
fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "application/octet-stream";
    };
    if let Some(format) = ImageFormat::parse(ext) {
        return format.mime_type();
    }
    if let Some(container) = VideoContainer::parse(ext) {
        return container.mime_type();
    }
    "application/octet-stream"
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn get(&self, uri: &str) -> Result<ContentObject> {
        let path = self.resolve(uri)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("object", uri));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(uri, path = %path.display(), size = bytes.len(), "Read object");
        let len = bytes.len();
        Ok(ContentObject::new(bytes, content_type_for(&path))
            .with_header("content-length", len.to_string()))
    }

    fn url(&self, uri: &str) -> Result<String> {
        let path = self.resolve(uri)?;
        let absolute = std::fs::canonicalize(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found("object", uri),
            _ => Error::from(e),
        })?;
        Ok(absolute.to_string_lossy().into_owned())
    }
}

// ---------------------------------------------------------------------------
// FileStyleStore
// ---------------------------------------------------------------------------

/// Styles loaded once from a JSON object of `name -> action path`.
#[derive(Debug, Clone, Default)]
pub struct FileStyleStore {
    styles: HashMap<String, String>,
}

impl FileStyleStore {
    /// A store with no styles.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json_str: &str) -> Result<Self> {
        let styles: BTreeMap<String, String> = serde_json::from_str(json_str)
            .map_err(|e| Error::invalid(format!("style file parse error: {e}")))?;
        Ok(Self {
            styles: styles.into_iter().collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let store = Self::from_json(&contents)?;
        tracing::info!(path = %path.display(), styles = store.len(), "Loaded styles");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[async_trait]
impl StyleStore for FileStyleStore {
    async fn get(&self, id: &str) -> Result<StyleDefinition> {
        self.styles
            .get(id)
            .map(|expansion| StyleDefinition {
                id: id.to_string(),
                expansion: expansion.clone(),
            })
            .ok_or_else(|| Error::not_found("style", id))
    }
}
