//! Application state for one map session and the handlers the presentation
//! layer calls for each user event. Every store mutation and filter change
//! resynchronizes the map.

use time::UtcOffset;
use tracing::debug;

use crate::draft::{Draft, PhotoCompletion, PhotoTicket};
use crate::error::{SessionError, StoreError};
use crate::gallery::{Gallery, GalleryKey, GalleryView};
use crate::markers::{MapSurface, MarkerSynchronizer, Viewport};
use crate::model::{
    Category, CategoryCounts, CategoryFilter, Coordinate, Memory, MemoryId, PhotoPayload,
};
use crate::photo::PhotoError;
use crate::storage::KeyValueStorage;
use crate::store::{Confirmation, MemoryStore};

pub struct Session<S, M>
where
    M: MapSurface,
{
    store: MemoryStore<S>,
    surface: M,
    markers: MarkerSynchronizer<M::Handle>,
    filter: CategoryFilter,
    draft: Option<Draft>,
    drafts_opened: u64,
    gallery: Gallery,
}

impl<S, M> Session<S, M>
where
    S: KeyValueStorage,
    M: MapSurface,
{
    /// Center the map on `viewport` and place markers for every memory.
    pub fn start(store: MemoryStore<S>, mut surface: M, viewport: Viewport) -> Self {
        surface.set_view(&viewport);
        let mut session = Self {
            store,
            surface,
            markers: MarkerSynchronizer::new(),
            filter: CategoryFilter::All,
            draft: None,
            drafts_opened: 0,
            gallery: Gallery::new(),
        };
        session.resync();
        session
    }

    /// Map click: open a fresh draft at `position`, replacing any open one.
    pub fn on_map_click(&mut self, position: Coordinate) -> &Draft {
        self.drafts_opened += 1;
        debug!(%position, generation = self.drafts_opened, "memory draft opened");
        self.draft.insert(Draft::new(self.drafts_opened, position))
    }

    /// Returns `false` when no draft is open.
    pub fn select_category(&mut self, category: Category) -> bool {
        match self.draft.as_mut() {
            Some(draft) => {
                draft.select_category(category);
                true
            }
            None => false,
        }
    }

    /// Reserve photo slots for `count` selected files. Empty when no draft is
    /// open.
    pub fn reserve_photos(&mut self, count: usize) -> Vec<PhotoTicket> {
        self.draft.as_mut().map(|draft| draft.reserve_photos(count)).unwrap_or_default()
    }

    pub fn complete_photo(
        &mut self,
        ticket: PhotoTicket,
        result: Result<PhotoPayload, PhotoError>,
    ) -> PhotoCompletion {
        match self.draft.as_mut() {
            Some(draft) => draft.complete_photo(ticket, result),
            None => PhotoCompletion::Stale,
        }
    }

    pub fn remove_draft_photo(&mut self, index: usize) -> Option<PhotoPayload> {
        self.draft.as_mut()?.remove_photo(index)
    }

    /// Save the open draft with the form's text fields.
    ///
    /// On success the draft is discarded and the map is resynchronized. On any
    /// error the draft stays open so the user can correct and resubmit.
    ///
    /// # Errors
    /// Returns [`SessionError::NoDraft`] when no draft is open, or the store's
    /// validation or storage error.
    pub fn save_draft(&mut self, title: &str, description: &str) -> Result<Memory, SessionError> {
        let draft = self.draft.as_ref().ok_or(SessionError::NoDraft)?;
        if draft.pending_reads() > 0 {
            debug!(pending = draft.pending_reads(), "saving draft with photo reads in flight");
        }
        let memory = self.store.create(draft.to_new_memory(title, description))?;
        self.draft = None;
        self.resync();
        Ok(memory)
    }

    pub fn cancel_draft(&mut self) {
        if self.draft.take().is_some() {
            debug!("memory draft discarded");
        }
    }

    /// Switch the active filter and rebuild markers. Returns the marker count.
    pub fn set_filter(&mut self, filter: CategoryFilter) -> usize {
        self.filter = filter;
        self.resync()
    }

    /// Delete after confirmation; unknown ids are ignored.
    ///
    /// # Errors
    /// Returns the store's storage error when the rewrite fails.
    pub fn delete_memory(
        &mut self,
        id: &MemoryId,
        confirmation: &mut impl Confirmation,
    ) -> Result<bool, StoreError> {
        let removed = self.store.delete(id, confirmation)?;
        if removed {
            if self.gallery.view().is_some_and(|view| &view.memory_id == id) {
                self.gallery.close();
            }
            self.resync();
        }
        Ok(removed)
    }

    /// Show popup dates in `offset` and rebuild the markers.
    pub fn set_display_offset(&mut self, offset: UtcOffset) -> usize {
        self.markers.set_display_offset(offset);
        self.resync()
    }

    pub fn open_gallery(&mut self, id: &MemoryId) -> bool {
        self.gallery.open(&self.store, id)
    }

    pub fn gallery_key(&mut self, key: GalleryKey) -> Option<GalleryView> {
        self.gallery.handle_key(key);
        self.gallery.view()
    }

    fn resync(&mut self) -> usize {
        self.markers.resync(&mut self.surface, &self.store, self.filter)
    }
}

impl<S, M> Session<S, M>
where
    M: MapSurface,
{
    #[must_use]
    pub fn store(&self) -> &MemoryStore<S> {
        &self.store
    }

    #[must_use]
    pub fn surface(&self) -> &M {
        &self.surface
    }

    #[must_use]
    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    #[must_use]
    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    #[must_use]
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    #[must_use]
    pub fn counts(&self) -> CategoryCounts {
        self.store.counts_by_category()
    }

    /// End the session: remove its markers and hand back the store and
    /// surface.
    pub fn finish(mut self) -> (MemoryStore<S>, M) {
        self.markers.clear(&mut self.surface);
        (self.store, self.surface)
    }
}
