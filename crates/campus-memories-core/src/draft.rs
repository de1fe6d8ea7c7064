//! Transient add-flow state: the clicked coordinate, the selected category and
//! the photos being attached to a memory that has not been saved yet.
//!
//! Photo reads finish in any order. Each read is issued against a
//! [`PhotoTicket`] reserved in selection order, and photos are displayed and
//! saved by ticket order rather than completion order. Tickets are bound to one
//! draft generation, so reads that finish after the draft was saved, cancelled
//! or replaced are dropped.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::model::{Category, Coordinate, PhotoPayload};
use crate::photo::PhotoError;
use crate::store::NewMemory;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhotoTicket {
    generation: u64,
    slot: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PhotoCompletion {
    Attached,
    Failed(PhotoError),
    /// The ticket belongs to a draft that no longer exists, or was already
    /// completed.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Draft {
    generation: u64,
    position: Coordinate,
    category: Option<Category>,
    next_slot: u64,
    outstanding: BTreeSet<u64>,
    photos: BTreeMap<u64, PhotoPayload>,
}

impl Draft {
    #[must_use]
    pub fn new(generation: u64, position: Coordinate) -> Self {
        Self {
            generation,
            position,
            category: None,
            next_slot: 0,
            outstanding: BTreeSet::new(),
            photos: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn position(&self) -> Coordinate {
        self.position
    }

    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn select_category(&mut self, category: Category) {
        self.category = Some(category);
    }

    /// Reserve one slot per selected file, in selection order.
    pub fn reserve_photos(&mut self, count: usize) -> Vec<PhotoTicket> {
        (0..count)
            .map(|_| {
                let slot = self.next_slot;
                self.next_slot += 1;
                self.outstanding.insert(slot);
                PhotoTicket { generation: self.generation, slot }
            })
            .collect()
    }

    /// Record the outcome of one photo read.
    pub fn complete_photo(
        &mut self,
        ticket: PhotoTicket,
        result: Result<PhotoPayload, PhotoError>,
    ) -> PhotoCompletion {
        if ticket.generation != self.generation || !self.outstanding.remove(&ticket.slot) {
            debug!(slot = ticket.slot, "dropping stale photo completion");
            return PhotoCompletion::Stale;
        }

        match result {
            Ok(payload) => {
                self.photos.insert(ticket.slot, payload);
                PhotoCompletion::Attached
            }
            Err(err) => {
                warn!(error = %err, "skipping photo that could not be read");
                PhotoCompletion::Failed(err)
            }
        }
    }

    /// Remove the attached photo at `index` in display order.
    pub fn remove_photo(&mut self, index: usize) -> Option<PhotoPayload> {
        let slot = *self.photos.keys().nth(index)?;
        self.photos.remove(&slot)
    }

    /// Attached photos in selection order.
    #[must_use]
    pub fn photos(&self) -> Vec<PhotoPayload> {
        self.photos.values().cloned().collect()
    }

    #[must_use]
    pub fn pending_reads(&self) -> usize {
        self.outstanding.len()
    }

    /// Build creation input from the draft plus the form's text fields.
    #[must_use]
    pub fn to_new_memory(&self, title: &str, description: &str) -> NewMemory {
        NewMemory {
            title: title.to_string(),
            description: description.to_string(),
            category: self.category,
            position: self.position,
            photos: self.photos(),
        }
    }
}
