//! Engine selection.
//!
//! The engine behind the C entry points is chosen through the
//! `ARENALLOC_ENGINE` environment variable:
//! - `free-list` (default): first-fit free list with split and coalesce.
//! - `slab`: fixed 4096-byte pages carved into power-of-two blocks.

use std::fmt;
use std::str::FromStr;

/// Environment variable consulted by [`EngineKind::from_env`].
pub const ENGINE_ENV: &str = "ARENALLOC_ENGINE";

const FREE_LIST_TAG: u64 = u64::from_le_bytes(*b"arenaFL1");
const SLAB_TAG: u64 = u64::from_le_bytes(*b"arenaSL1");

/// Which allocator engine manages an arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Variable-size blocks on one address-ordered list.
    #[default]
    FreeList,
    /// Page-granular size classes.
    Slab,
}

impl EngineKind {
    pub const ALL: [Self; 2] = [Self::FreeList, Self::Slab];

    /// Parse from string (case-insensitive), `None` for unknown names.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free-list" | "freelist" | "free_list" | "list" | "first-fit" => Some(Self::FreeList),
            "slab" | "page" | "pages" | "mccusick" => Some(Self::Slab),
            _ => None,
        }
    }

    /// Parse from string, falling back to the default engine.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Reads [`ENGINE_ENV`]; unset or unknown values select the default.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(ENGINE_ENV)
            .map(|v| Self::from_str_loose(&v))
            .unwrap_or_default()
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FreeList => "free-list",
            Self::Slab => "slab",
        }
    }

    pub(crate) const fn tag(self) -> u64 {
        match self {
            Self::FreeList => FREE_LIST_TAG,
            Self::Slab => SLAB_TAG,
        }
    }

    pub(crate) const fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            FREE_LIST_TAG => Some(Self::FreeList),
            SLAB_TAG => Some(Self::Slab),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown engine `{s}` (expected free-list or slab)"))
    }
}
