use serde::Serialize;

use crate::model::{MemoryId, PhotoPayload};
use crate::store::MemoryStore;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GalleryKey {
    Left,
    Right,
    Escape,
}

impl GalleryKey {
    /// Accepts both short names and DOM key names (`ArrowLeft`, `Escape`, ...).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "arrowleft" | "prev" => Some(Self::Left),
            "right" | "arrowright" | "next" => Some(Self::Right),
            "escape" | "esc" | "close" => Some(Self::Escape),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct GallerySession {
    memory_id: MemoryId,
    photos: Vec<PhotoPayload>,
    index: usize,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct GalleryView {
    pub memory_id: MemoryId,
    pub image: PhotoPayload,
    pub index: usize,
    pub total: usize,
    /// `current / total`, one-based.
    pub counter: String,
    pub show_navigation: bool,
}

/// Cyclic viewer over one memory's photos.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    session: Option<GallerySession>,
}

impl Gallery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the photos of `memory_id` at the first photo. Unknown ids and
    /// memories without photos leave the gallery as it was.
    pub fn open<S>(&mut self, store: &MemoryStore<S>, memory_id: &MemoryId) -> bool {
        let Some(memory) = store.get(memory_id) else {
            return false;
        };
        if memory.photos.is_empty() {
            return false;
        }
        self.session = Some(GallerySession {
            memory_id: memory.id.clone(),
            photos: memory.photos.clone(),
            index: 0,
        });
        true
    }

    pub fn next(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.index = (session.index + 1) % session.photos.len();
        }
    }

    pub fn prev(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let len = session.photos.len();
            session.index = (session.index + len - 1) % len;
        }
    }

    pub fn close(&mut self) {
        self.session = None;
    }

    /// Apply a keyboard event; ignored while the gallery is closed.
    pub fn handle_key(&mut self, key: GalleryKey) {
        if !self.is_open() {
            return;
        }
        match key {
            GalleryKey::Left => self.prev(),
            GalleryKey::Right => self.next(),
            GalleryKey::Escape => self.close(),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.index)
    }

    #[must_use]
    pub fn view(&self) -> Option<GalleryView> {
        let session = self.session.as_ref()?;
        let total = session.photos.len();
        Some(GalleryView {
            memory_id: session.memory_id.clone(),
            image: session.photos.get(session.index)?.clone(),
            index: session.index,
            total,
            counter: format!("{} / {total}", session.index + 1),
            show_navigation: total > 1,
        })
    }
}
