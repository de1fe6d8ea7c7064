//! Map decorations derived from the store.
//!
//! Every state change clears the markers placed by the previous pass and
//! rebuilds them from the filtered collection.

use std::collections::BTreeMap;

use serde::Serialize;
use time::macros::format_description;
use time::UtcOffset;
use tracing::debug;

use crate::model::{Category, CategoryFilter, Coordinate, Memory, MemoryId, PhotoPayload};
use crate::store::MemoryStore;

pub const CAMPUS_CENTER: Coordinate = Coordinate { lat: 23.1328, lng: 72.5438 };
pub const DEFAULT_ZOOM: u8 = 16;
pub const EMPTY_DESCRIPTION: &str = "No description";

const PIN_SIZE: (u32, u32) = (40, 50);
const PIN_ANCHOR: (i32, i32) = (20, 50);
const POPUP_ANCHOR: (i32, i32) = (0, -50);

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: u8,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { center: CAMPUS_CENTER, zoom: DEFAULT_ZOOM }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MarkerIcon {
    pub category: Category,
    pub glyph: &'static str,
    pub color: &'static str,
    pub svg: String,
    pub size: (u32, u32),
    pub anchor: (i32, i32),
    pub popup_anchor: (i32, i32),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryBadge {
    pub category: Category,
    pub glyph: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Thumbnail {
    pub src: PhotoPayload,
    pub extra_photos: usize,
    /// `+N more` when the memory has more than one photo.
    pub more_label: Option<String>,
    pub gallery_target: MemoryId,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PopupView {
    pub title: String,
    pub badge: CategoryBadge,
    pub description: String,
    pub date: String,
    pub thumbnail: Option<Thumbnail>,
    pub delete_target: MemoryId,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerView {
    pub memory_id: MemoryId,
    pub position: Coordinate,
    pub icon: MarkerIcon,
    pub popup: PopupView,
}

/// Map widget seam: one marker per visible memory.
pub trait MapSurface {
    type Handle;

    fn set_view(&mut self, viewport: &Viewport);

    fn add_marker(&mut self, marker: MarkerView) -> Self::Handle;

    fn remove_marker(&mut self, handle: Self::Handle);
}

/// Pin graphic for a category: a teardrop filled with the category color, a
/// translucent inner circle and the category glyph.
#[must_use]
pub fn marker_pin_svg(category: Category) -> String {
    format!(
        concat!(
            r#"<svg width="40" height="50" viewBox="0 0 40 50" fill="none" xmlns="http://www.w3.org/2000/svg">"#,
            r#"<path d="M20 0C8.954 0 0 8.954 0 20c0 14.5 20 30 20 30s20-15.5 20-30C40 8.954 31.046 0 20 0z" fill="{color}"/>"#,
            r#"<circle cx="20" cy="18" r="10" fill="white" fill-opacity="0.3"/>"#,
            r#"<text x="20" y="23" text-anchor="middle" font-size="14">{glyph}</text>"#,
            "</svg>"
        ),
        color = category.color(),
        glyph = category.glyph(),
    )
}

#[must_use]
pub fn marker_icon(category: Category) -> MarkerIcon {
    MarkerIcon {
        category,
        glyph: category.glyph(),
        color: category.color(),
        svg: marker_pin_svg(category),
        size: PIN_SIZE,
        anchor: PIN_ANCHOR,
        popup_anchor: POPUP_ANCHOR,
    }
}

#[must_use]
/// Popup contents for `memory`, with the creation date shown in `offset`.
pub fn render_popup(memory: &Memory, offset: UtcOffset) -> PopupView {
    let description = if memory.description.is_empty() {
        EMPTY_DESCRIPTION.to_string()
    } else {
        memory.description.clone()
    };

    let created_at = memory.created_at.checked_to_offset(offset).unwrap_or(memory.created_at);
    let date = created_at
        .format(format_description!("[month repr:short] [day padding:none], [year]"))
        .unwrap_or_else(|_| created_at.date().to_string());

    let thumbnail = memory.photos.first().map(|first| {
        let extra_photos = memory.photos.len() - 1;
        Thumbnail {
            src: first.clone(),
            extra_photos,
            more_label: (extra_photos > 0).then(|| format!("+{extra_photos} more")),
            gallery_target: memory.id.clone(),
        }
    });

    PopupView {
        title: memory.title.clone(),
        badge: CategoryBadge {
            category: memory.category,
            glyph: memory.category.glyph(),
            label: memory.category.label(),
        },
        description,
        date,
        thumbnail,
        delete_target: memory.id.clone(),
    }
}

#[must_use]
pub fn render_marker(memory: &Memory, offset: UtcOffset) -> MarkerView {
    MarkerView {
        memory_id: memory.id.clone(),
        position: memory.position(),
        icon: marker_icon(memory.category),
        popup: render_popup(memory, offset),
    }
}

/// Tracks the markers placed on a surface so the next pass can remove exactly
/// those.
#[derive(Debug)]
pub struct MarkerSynchronizer<H> {
    placed: Vec<H>,
    display_offset: UtcOffset,
}

impl<H> Default for MarkerSynchronizer<H> {
    fn default() -> Self {
        Self { placed: Vec::new(), display_offset: UtcOffset::UTC }
    }
}

impl<H> MarkerSynchronizer<H> {
    /// Popup dates are shown in UTC until [`Self::set_display_offset`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display_offset(&self) -> UtcOffset {
        self.display_offset
    }

    /// Offset used for popup dates from the next resync on.
    pub fn set_display_offset(&mut self, offset: UtcOffset) {
        self.display_offset = offset;
    }

    #[must_use]
    pub fn placed(&self) -> usize {
        self.placed.len()
    }

    /// Remove every marker this synchronizer placed. Calling it twice is a no-op.
    pub fn clear<M>(&mut self, surface: &mut M)
    where
        M: MapSurface<Handle = H>,
    {
        for handle in self.placed.drain(..) {
            surface.remove_marker(handle);
        }
    }

    /// Rebuild the surface's markers from the store's view under `filter`.
    /// Returns the number of markers placed.
    pub fn resync<M, S>(
        &mut self,
        surface: &mut M,
        store: &MemoryStore<S>,
        filter: CategoryFilter,
    ) -> usize
    where
        M: MapSurface<Handle = H>,
    {
        self.clear(surface);
        for memory in store.filter(filter) {
            let handle = surface.add_marker(render_marker(memory, self.display_offset));
            self.placed.push(handle);
        }
        debug!(filter = %filter, markers = self.placed.len(), "map markers resynced");
        self.placed.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MarkerHandle(u64);

/// In-process map surface that records the markers currently shown.
#[derive(Debug, Clone, Default)]
pub struct MarkerLayer {
    viewport: Option<Viewport>,
    next_handle: u64,
    markers: BTreeMap<MarkerHandle, MarkerView>,
}

impl MarkerLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Markers currently shown, in placement order.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerView> {
        self.markers.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl MapSurface for MarkerLayer {
    type Handle = MarkerHandle;

    fn set_view(&mut self, viewport: &Viewport) {
        self.viewport = Some(*viewport);
    }

    fn add_marker(&mut self, marker: MarkerView) -> Self::Handle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        self.markers.insert(handle, marker);
        handle
    }

    fn remove_marker(&mut self, handle: Self::Handle) {
        self.markers.remove(&handle);
    }
}
