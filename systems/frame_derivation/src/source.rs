use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use patrol_view_core::{Episode, EpisodeBatch, Frame};

static NEXT_FEED_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a live feed; a restarted feed receives a fresh identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedId(u64);

impl FeedId {
    fn next() -> Self {
        Self(NEXT_FEED_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Frames received so far from a live session, in arrival order.
///
/// A feed keeps at most [`Self::retention`] frames; older frames are evicted
/// as new ones arrive and counted by [`Self::evicted`].
#[derive(Clone, Debug)]
pub struct LiveFeed {
    id: FeedId,
    frames: Arc<Vec<Arc<Frame>>>,
    retention: usize,
    evicted: usize,
}

impl LiveFeed {
    /// Creates an empty, unbounded feed with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: FeedId::next(),
            frames: Arc::new(Vec::new()),
            retention: usize::MAX,
            evicted: 0,
        }
    }

    /// Keeps only the `limit` most recent frames (at least one).
    #[must_use]
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = limit.max(1);
        self.evict();
        self
    }

    /// Maximum number of frames kept.
    #[must_use]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Frames dropped from the front since the feed started.
    #[must_use]
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Identity of the feed.
    #[must_use]
    pub fn id(&self) -> FeedId {
        self.id
    }

    /// Appends a frame, evicting the oldest one once the feed is full.
    pub fn push(&mut self, frame: Frame) {
        Arc::make_mut(&mut self.frames).push(Arc::new(frame));
        self.evict();
    }

    fn evict(&mut self) {
        let excess = self.frames.len().saturating_sub(self.retention);
        if excess > 0 {
            let _ = Arc::make_mut(&mut self.frames).drain(..excess);
            self.evicted += excess;
        }
    }

    /// Drops every frame and takes a fresh identity, as for a new execution.
    pub fn restart(&mut self) {
        *self = Self::new().with_retention(self.retention);
    }

    /// Frames in arrival order.
    #[must_use]
    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    /// Number of frames received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Input observed by the derivation engine.
#[derive(Clone, Copy, Debug)]
pub enum FrameSource<'a> {
    /// Frames streamed from a live session.
    Live(&'a LiveFeed),
    /// Recorded episodes replayed back to back.
    Batch(&'a EpisodeBatch),
}

impl FrameSource<'_> {
    /// Total number of frames exposed by the source.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Live(feed) => feed.len(),
            Self::Batch(batch) => batch.frame_count(),
        }
    }

    /// Frames dropped from the front of the source before the first exposed one.
    #[must_use]
    pub fn evicted(&self) -> usize {
        match self {
            Self::Live(feed) => feed.evicted(),
            Self::Batch(_) => 0,
        }
    }

    pub(crate) fn key(&self) -> SourceKey {
        match self {
            Self::Live(feed) => SourceKey::Live(feed.id()),
            Self::Batch(batch) => SourceKey::Batch(Arc::clone(batch.episode_list())),
        }
    }

    pub(crate) fn flatten(&self) -> Arc<Vec<Arc<Frame>>> {
        match self {
            Self::Live(feed) => Arc::clone(&feed.frames),
            Self::Batch(batch) => Arc::new(
                batch
                    .episodes()
                    .iter()
                    .flat_map(|episode| episode.frames.iter().cloned())
                    .collect(),
            ),
        }
    }
}

/// Identity of an observed source.
///
/// Batches are keyed by their shared episode list, which is retained so the
/// allocation cannot be reused by an unrelated batch while it is cached.
#[derive(Clone, Debug)]
pub(crate) enum SourceKey {
    Live(FeedId),
    Batch(Arc<[Episode]>),
}

impl PartialEq for SourceKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Live(left), Self::Live(right)) => left == right,
            (Self::Batch(left), Self::Batch(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

/// Fingerprint deciding whether the flattened frame list must be rebuilt.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Fingerprint {
    pub(crate) source: SourceKey,
    pub(crate) frame_count: usize,
    pub(crate) evicted: usize,
}
