//! Per-request state threaded through hooks and execution.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;

use mg_core::{Error, ImageFormat, Result, RuntimeLimits};

use crate::imaging::{Canvas, JobCounter};
use crate::mask::ActionMask;
use crate::store::{ContentObject, ContentStore};

// ---------------------------------------------------------------------------
// Feature flags
// ---------------------------------------------------------------------------

/// Context-level switches that change decode or encode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    /// Upper bound on frames read from an animated source.
    MaxFrames,
    /// Whether every frame of an animated source is decoded.
    Animated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue {
    Bool(bool),
    Number(u64),
}

/// Feature flags set by hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    values: HashMap<FeatureKey, FeatureValue>,
}

impl Features {
    pub fn set(&mut self, key: FeatureKey, value: FeatureValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: FeatureKey) -> Option<FeatureValue> {
        self.values.get(&key).copied()
    }

    /// Boolean flag, `None` if unset or numeric.
    pub fn bool(&self, key: FeatureKey) -> Option<bool> {
        match self.get(key)? {
            FeatureValue::Bool(b) => Some(b),
            FeatureValue::Number(_) => None,
        }
    }

    /// Numeric flag, `None` if unset or boolean.
    pub fn number(&self, key: FeatureKey) -> Option<u64> {
        match self.get(key)? {
            FeatureValue::Number(n) => Some(n),
            FeatureValue::Bool(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// A mutation requested by a hook, applied by the dispatcher once every
/// hook of the phase has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Enable(usize),
    Disable(usize),
    DisableAll,
    SetFeature(FeatureKey, FeatureValue),
}

// ---------------------------------------------------------------------------
// Source and result
// ---------------------------------------------------------------------------

/// Where the processor reads the resource from.
#[derive(Debug, Clone)]
pub enum SourceHandle {
    /// Fetched into memory.
    Buffered(ContentObject),
    /// Read by an external tool straight from a URL.
    Remote { url: String },
}

/// Facts about the decoded (or probed) source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Frames decoded; 1 for still images.
    pub frames: u32,
    /// Size of the stored object.
    pub byte_size: u64,
}

impl MediaMetadata {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Final payload of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub payload: Bytes,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
}

impl ProcessOutcome {
    pub fn new(payload: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.into(),
            headers: BTreeMap::new(),
        }
    }

    /// The stored object unchanged.
    pub fn passthrough(object: &ContentObject) -> Self {
        Self {
            payload: object.bytes.clone(),
            content_type: object.content_type.clone(),
            headers: object.headers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineContext
// ---------------------------------------------------------------------------

/// Mutable state of one request.
///
/// Created fresh per request by the dispatcher; the mask owns the token
/// list so positions always line up.
pub struct PipelineContext {
    pub uri: String,
    pub mask: ActionMask,
    pub features: Features,
    /// Headers added to the outcome.
    pub headers: BTreeMap<String, String>,
    /// Limits in force for this request.
    pub limits: Arc<RuntimeLimits>,
    pub store: Arc<dyn ContentStore>,
    pub jobs: JobCounter,
    pub source: Option<SourceHandle>,
    pub metadata: Option<MediaMetadata>,
    pub canvas: Option<Canvas>,
    pub result: Option<ProcessOutcome>,
}

impl PipelineContext {
    pub fn new(
        uri: impl Into<String>,
        tokens: Vec<String>,
        store: Arc<dyn ContentStore>,
        limits: Arc<RuntimeLimits>,
    ) -> Self {
        Self {
            uri: uri.into(),
            mask: ActionMask::new(tokens),
            features: Features::default(),
            headers: BTreeMap::new(),
            limits,
            store,
            jobs: JobCounter::default(),
            source: None,
            metadata: None,
            canvas: None,
            result: None,
        }
    }

    /// Builder: share a processor's job counter.
    pub fn with_jobs(mut self, jobs: JobCounter) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn tokens(&self) -> &[String] {
        self.mask.tokens()
    }

    /// Apply hook intents in order; a later intent overrides an earlier one.
    pub fn apply(&mut self, intents: impl IntoIterator<Item = Intent>) -> Result<()> {
        for intent in intents {
            match intent {
                Intent::Enable(i) | Intent::Disable(i) if i >= self.mask.len() => {
                    return Err(Error::Internal(format!(
                        "intent {intent:?} outside {} positions",
                        self.mask.len()
                    )));
                }
                Intent::Enable(i) => self.mask.enable(i),
                Intent::Disable(i) => self.mask.disable(i),
                Intent::DisableAll => self.mask.disable_all(),
                Intent::SetFeature(key, value) => self.features.set(key, value),
            }
        }
        Ok(())
    }

    /// The buffered source object, if the processor fetched one.
    pub fn buffered_source(&self) -> Option<&ContentObject> {
        match &self.source {
            Some(SourceHandle::Buffered(object)) => Some(object),
            _ => None,
        }
    }

    /// URL of a remote source.
    pub fn remote_url(&self) -> Result<&str> {
        match &self.source {
            Some(SourceHandle::Remote { url }) => Ok(url),
            _ => Err(Error::invalid("no remote source available")),
        }
    }

    pub fn metadata(&self) -> Result<&MediaMetadata> {
        self.metadata
            .as_ref()
            .ok_or_else(|| Error::invalid("source metadata not available"))
    }

    pub fn canvas(&self) -> Result<&Canvas> {
        self.canvas
            .as_ref()
            .ok_or_else(|| Error::invalid("no decoded image available"))
    }

    pub fn canvas_mut(&mut self) -> Result<&mut Canvas> {
        self.canvas
            .as_mut()
            .ok_or_else(|| Error::invalid("no decoded image available"))
    }

    /// Run `f` against the canvas on a blocking thread.
    ///
    /// The canvas is put back even when `f` fails.
    pub async fn transform_canvas<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Canvas) -> Result<()> + Send + 'static,
    {
        let mut canvas = self
            .canvas
            .take()
            .ok_or_else(|| Error::invalid("no decoded image available"))?;
        let (canvas, outcome) = self
            .jobs
            .run(move || {
                let outcome = f(&mut canvas);
                Ok((canvas, outcome))
            })
            .await?;
        self.canvas = Some(canvas);
        outcome
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("uri", &self.uri)
            .field("mask", &self.mask)
            .field("features", &self.features)
            .field("metadata", &self.metadata)
            .field("has_canvas", &self.canvas.is_some())
            .field("has_result", &self.result.is_some())
            .finish_non_exhaustive()
    }
}
