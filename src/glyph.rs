// SPDX-License-Identifier: GPL-3.0-only

//! Glyph resolution: (key code, layout, level) to displayable labels.
//!
//! Every key resolves to a [`GlyphSet`] of exactly four candidate labels,
//! one per shift level ({normal, shift, level-3, level-3+shift}), or to
//! the empty set for the `0` sentinel and wholly unmapped keys. The set
//! is resolved in one pass; readers never observe a partially populated
//! set.

use crate::server::{InputServer, KeyCode, Keysym};

/// The candidate labels of one on-screen key.
///
/// A resolved set has either four entries or none. Shorter sets can be
/// constructed directly, which the button state machine tolerates (and
/// uses to reject level-3 toggles).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphSet {
    entries: Vec<String>,
}

impl GlyphSet {
    /// The empty set: no key bound or no mapping.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the glyph at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }
}

impl From<Vec<String>> for GlyphSet {
    fn from(entries: Vec<String>) -> Self {
        Self { entries }
    }
}

impl<const N: usize> From<[&str; N]> for GlyphSet {
    fn from(entries: [&str; N]) -> Self {
        Self {
            entries: entries.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Resolves the four-level glyph set for `key_code` under the layout at
/// `layout_index`.
///
/// Fallback policy for unmapped levels:
///
/// - shift falls back to the unshifted symbol,
/// - level-3 falls back to the unshifted symbol,
/// - level-3+shift falls back to the shift symbol, unless level-3 itself
///   had already fallen back, in which case it falls back to the
///   unshifted symbol (an unmapped level-3 must not compound two
///   different fallbacks).
///
/// `key_code == 0` short-circuits to the empty set before any server
/// query, as does a key with no symbol at any level.
pub fn resolve<S: InputServer>(server: &S, key_code: KeyCode, layout_index: u32) -> GlyphSet {
    if key_code == 0 {
        return GlyphSet::empty();
    }

    let normal = server.keysym_at_level(key_code, layout_index, 0);
    let shift_raw = server.keysym_at_level(key_code, layout_index, 1);
    let level3_raw = server.keysym_at_level(key_code, layout_index, 2);
    let shift_level3_raw = server.keysym_at_level(key_code, layout_index, 3);

    if normal.is_none() && shift_raw.is_none() && level3_raw.is_none() && shift_level3_raw.is_none()
    {
        return GlyphSet::empty();
    }

    let shift = shift_raw.or(normal);
    let level3 = level3_raw.or(normal);
    let shift_level3 = shift_level3_raw.or(if level3_raw.is_none() { normal } else { shift });

    GlyphSet::from(vec![
        glyph_text(server, normal),
        glyph_text(server, shift),
        glyph_text(server, level3),
        glyph_text(server, shift_level3),
    ])
}

/// Converts a resolved symbol to a single displayable character.
///
/// Unconvertible symbols (dead keys among them) yield the empty string;
/// that blank rendering is contractual, not a resolution failure.
fn glyph_text<S: InputServer>(server: &S, keysym: Option<Keysym>) -> String {
    let Some(keysym) = keysym else {
        return String::new();
    };
    server
        .keysym_to_text(keysym)
        .chars()
        .next()
        .map(String::from)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
