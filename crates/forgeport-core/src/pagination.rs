//! Page contract shared by all provider adapters
//!
//! Providers disagree on pagination: GitHub uses 1-based page numbers with no
//! grand total, GitLab reports an exact total through a response header,
//! Bitbucket returns an optional `size` field, and CodeCommit only has opaque
//! continuation tokens. Adapters translate whatever the provider speaks into
//! this contract.

use serde::{Deserialize, Serialize};

/// A page request with a 0-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 0-based page index.
    pub index: u64,
    /// Number of items per page.
    pub size: u64,
}

impl PageRequest {
    pub fn new(index: u64, size: u64) -> Self {
        Self { index, size }
    }

    /// First page with the given size.
    pub fn first(size: u64) -> Self {
        Self { index: 0, size }
    }

    /// Clamp the page size into a sane range.
    pub fn normalize(self) -> Self {
        Self {
            index: self.index,
            size: self.size.clamp(1, 100),
        }
    }

    /// Offset of the first item of this page.
    pub fn offset(&self) -> u64 {
        self.index * self.size
    }

    /// The 1-based page number most REST APIs expect.
    pub fn one_based(&self) -> u64 {
        self.index + 1
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { index: 0, size: 20 }
    }
}

/// One page of results.
///
/// `total` is best-effort: when the backing provider cannot report an exact
/// total, the adapter sets `total` to the number of items returned by that
/// call, signalling "total unknown, more may exist". Callers must not assume
/// exactness across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub index: u64,
    pub size: u64,
    pub total: u64,
}

impl<T> Page<T> {
    /// Build a page from a provider that reported an exact total.
    pub fn with_total(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            index: request.index,
            size: request.size,
            total,
        }
    }

    /// Build a page from a provider that cannot report a total. The total is
    /// set to the returned item count, never a guessed number.
    pub fn unknown_total(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as u64;
        Self {
            items,
            index: request.index,
            size: request.size,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            index: self.index,
            size: self.size,
            total: self.total,
        }
    }
}

/// Slice a fully-materialized listing down to one page window.
///
/// Used by adapters that can only fetch a whole listing (or fetch
/// cursor-by-cursor) and must cut it to the caller's page. The window for
/// page N of size S over T items holds `min(S, max(0, T - N*S))` items.
pub fn page_window<T>(items: Vec<T>, request: PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.size as usize)
        .collect()
}
