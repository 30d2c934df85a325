// SPDX-License-Identifier: GPL-3.0-only

//! Configured keyboard layouts and the active-layout registry.
//!
//! The registry mirrors the layout list owned by the session's layout
//! service. It is refreshed on demand (the service's change signals
//! carry no payload, so the receiver re-queries) and falls back to a
//! single placeholder layout when the service is unreachable or its
//! reply is invalid. Degraded operation is silent; the next refresh
//! retries naturally.

use crate::app_settings::PLACEHOLDER_LAYOUT;

/// One configured keyboard layout.
///
/// Layouts are identified by position in the configured list, not by
/// identifier: duplicates with different variants are legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Short identifier, e.g. "us" or "fr".
    pub short_id: String,
    /// Human-readable display name.
    pub name: String,
    /// Variant name, may be empty.
    pub variant: String,
}

impl Layout {
    #[must_use]
    pub fn new(short_id: &str, name: &str, variant: &str) -> Self {
        Self {
            short_id: short_id.to_string(),
            name: name.to_string(),
            variant: variant.to_string(),
        }
    }

    /// The layout reported while the real list is unavailable.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_LAYOUT, "", "")
    }
}

/// Ordered list of configured layouts plus the active index.
///
/// Invariant: `active < len()` whenever the list is non-empty; the
/// active index is forced to 0 otherwise. A failed active-index refresh
/// latches the placeholder until a valid refresh arrives.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: Vec<Layout>,
    active: usize,
    degraded: bool,
}

impl LayoutRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured list wholesale.
    ///
    /// Readers never observe a partial list. If the new list no longer
    /// covers the active index, the index snaps to 0 until the service's
    /// follow-up active-index refresh lands.
    pub fn replace_list(&mut self, layouts: Vec<Layout>) {
        self.layouts = layouts;
        if self.active >= self.layouts.len() {
            self.active = 0;
        }
        tracing::debug!(count = self.layouts.len(), "layout list replaced");
    }

    /// Applies a re-queried active index.
    ///
    /// `None` (query failed) or an index outside the current list counts
    /// as an invalid reply: the registry falls back to index 0 and the
    /// placeholder identifier, and stays there until a valid refresh.
    pub fn set_active(&mut self, reply: Option<u32>) {
        match reply {
            Some(index) if (index as usize) < self.layouts.len() => {
                self.active = index as usize;
                self.degraded = false;
            }
            Some(index) => {
                tracing::warn!(
                    index,
                    count = self.layouts.len(),
                    "active layout index out of range, using placeholder"
                );
                self.active = 0;
                self.degraded = true;
            }
            None => {
                tracing::warn!("active layout query failed, using placeholder");
                self.active = 0;
                self.degraded = true;
            }
        }
    }

    /// Index of the active layout; 0 while the list is empty.
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// The active layout, or the placeholder while degraded or empty.
    #[must_use]
    pub fn active_layout(&self) -> Layout {
        if self.degraded {
            return Layout::placeholder();
        }
        self.layouts
            .get(self.active)
            .cloned()
            .unwrap_or_else(Layout::placeholder)
    }

    #[must_use]
    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
