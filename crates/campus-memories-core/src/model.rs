use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

/// Opaque record identifier. New records get ULID text; ids written by
/// earlier versions (for example millisecond timestamps) are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Any non-blank text is a valid id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MemoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of memory categories. Display metadata is static configuration
/// and never stored with the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Study,
    Fun,
    Friends,
    Food,
    Events,
    Sports,
}

impl Category {
    pub const ALL: [Self; 6] =
        [Self::Study, Self::Fun, Self::Friends, Self::Food, Self::Events, Self::Sports];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Fun => "fun",
            Self::Friends => "friends",
            Self::Food => "food",
            Self::Events => "events",
            Self::Sports => "sports",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "study" => Some(Self::Study),
            "fun" => Some(Self::Fun),
            "friends" => Some(Self::Friends),
            "food" => Some(Self::Food),
            "events" => Some(Self::Events),
            "sports" => Some(Self::Sports),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Study => "Study",
            Self::Fun => "Fun",
            Self::Friends => "Friends",
            Self::Food => "Food",
            Self::Events => "Events",
            Self::Sports => "Sports",
        }
    }

    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Study => "📚",
            Self::Fun => "🎉",
            Self::Friends => "👥",
            Self::Food => "🍕",
            Self::Events => "🎭",
            Self::Sports => "⚽",
        }
    }

    /// Pin and badge color as a CSS hex string.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Study => "#4f46e5",
            Self::Fun => "#f59e0b",
            Self::Friends => "#ec4899",
            Self::Food => "#ef4444",
            Self::Events => "#8b5cf6",
            Self::Sports => "#10b981",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active marker filter: every memory, or only one category.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    #[must_use]
    pub fn matches(self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(expected) => expected == category,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(category) => category.as_str(),
        }
    }
}

impl Display for CategoryFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "all" {
            return Ok(Self::All);
        }
        Category::parse(&normalized)
            .map(Self::Only)
            .ok_or_else(|| format!("unknown category filter `{value}`"))
    }
}

impl Serialize for CategoryFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Inline image payload, stored as a `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct PhotoPayload(pub String);

impl PhotoPayload {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: MemoryId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub photos: Vec<PhotoPayload>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Memory {
    #[must_use]
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Badge counts: one entry per configured category plus the overall total.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct CategoryCounts {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl CategoryCounts {
    pub(crate) fn tally<'a>(memories: impl IntoIterator<Item = &'a Memory>) -> Self {
        let mut by_category =
            Category::ALL.iter().map(|category| (*category, 0)).collect::<BTreeMap<_, _>>();
        let mut total = 0;
        for memory in memories {
            *by_category.entry(memory.category).or_insert(0) += 1;
            total += 1;
        }
        Self { total, by_category }
    }

    #[must_use]
    pub fn get(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}
