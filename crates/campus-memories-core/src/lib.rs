//! Campus Memories core: memory records pinned to map coordinates, their
//! write-through store, map marker synchronization, and the photo gallery.

mod draft;
mod error;
mod gallery;
mod markers;
mod model;
mod photo;
mod session;
mod storage;
mod store;

pub use draft::{Draft, PhotoCompletion, PhotoTicket};
pub use error::{SessionError, StoreError, ValidationError};
pub use gallery::{Gallery, GalleryKey, GalleryView};
pub use markers::{
    marker_icon, marker_pin_svg, render_marker, render_popup, CategoryBadge, MapSurface,
    MarkerHandle, MarkerIcon, MarkerLayer, MarkerSynchronizer, MarkerView, PopupView, Thumbnail,
    Viewport, CAMPUS_CENTER, DEFAULT_ZOOM, EMPTY_DESCRIPTION,
};
pub use model::{
    Category, CategoryCounts, CategoryFilter, Coordinate, Memory, MemoryId, PhotoPayload,
};
pub use photo::{encode_photo, image_mime_type, PhotoError};
pub use session::Session;
pub use storage::{InMemoryStorage, KeyValueStorage, StorageError};
pub use store::{
    Confirmation, LoadReport, LoadSource, MemoryStore, NewMemory, DEFAULT_STORAGE_KEY,
    DELETE_PROMPT,
};
