// SPDX-License-Identifier: GPL-3.0-only

//! Per-key display state and the press-and-hold repeat state machine.
//!
//! Each on-screen key owns a [`ButtonState`]: the four candidate glyphs
//! for its key code, the index selecting the displayed one, and the
//! caps/shift/level-3 flags the index is derived from. The visible label
//! is always re-derived from `(glyph, case transform)`; the glyph set
//! itself is never mutated by rendering.

use crate::glyph::GlyphSet;
use crate::server::KeyCode;

/// Display state of one on-screen key.
#[derive(Debug, Clone, Default)]
pub struct ButtonState {
    key_code: KeyCode,
    glyphs: GlyphSet,
    index: usize,
    caps: bool,
    shift: bool,
    level3: bool,
    checked: bool,
}

impl ButtonState {
    #[must_use]
    pub fn new(key_code: KeyCode) -> Self {
        Self {
            key_code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn key_code(&self) -> KeyCode {
        self.key_code
    }

    #[must_use]
    pub fn glyphs(&self) -> &GlyphSet {
        &self.glyphs
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Installs freshly resolved glyphs (layout change or construction)
    /// and re-derives the selected index from the current flags.
    pub fn set_glyphs(&mut self, glyphs: GlyphSet) {
        self.glyphs = glyphs;
        self.index = self.derive_index();
    }

    fn derive_index(&self) -> usize {
        let count = self.glyphs.count();
        if count == 0 {
            return 0;
        }
        let mut index = 0;
        if self.shift {
            index += 1;
        }
        if self.level3 && count >= 3 {
            index += 2;
        }
        index % count
    }

    /// Toggles the shift contribution: +-1 on the selected index.
    ///
    /// No-op on an empty glyph set (flag unchanged) and when the flag
    /// already has the requested value.
    pub fn set_shift(&mut self, mode: bool) {
        if self.glyphs.is_empty() || self.shift == mode {
            return;
        }
        self.shift = mode;
        self.step_index(if mode { 1 } else { -1 });
    }

    /// Toggles the level-3 contribution: +-2 on the selected index.
    ///
    /// Rejected (no-op, flag unchanged) when the glyph set has fewer
    /// than 3 entries; such keys have no level-3 face to show.
    pub fn set_level3(&mut self, mode: bool) {
        if self.glyphs.count() < 3 || self.level3 == mode {
            return;
        }
        self.level3 = mode;
        self.step_index(if mode { 2 } else { -2 });
    }

    /// Sets the caps flag. Never moves the index; caps only flips the
    /// case of the displayed glyph.
    pub fn set_caps(&mut self, mode: bool) {
        if self.glyphs.is_empty() {
            return;
        }
        self.caps = mode;
    }

    /// Checked state for toggle-style modifier buttons.
    pub fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
    }

    #[must_use]
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    // Indices transiently go negative here, so wrap by adding the
    // modulus instead of taking a remainder.
    fn step_index(&mut self, delta: i32) {
        let count = self.glyphs.count() as i32;
        let mut index = self.index as i32 + delta;
        if index < 0 {
            index += count;
        }
        if index >= count {
            index -= count;
        }
        debug_assert!((0..count).contains(&index), "index out of glyph range");
        self.index = index as usize;
    }

    /// The label currently displayed: the selected glyph with the case
    /// transform applied. Caps uppercases, shift inverts the transform
    /// (shift+caps renders lowercase, matching a physical keyboard).
    #[must_use]
    pub fn label(&self) -> String {
        let Some(glyph) = self.glyphs.get(self.index) else {
            return String::new();
        };

        let mut do_caps = self.caps;
        if self.shift {
            do_caps = !do_caps;
        }

        if do_caps {
            glyph.to_uppercase()
        } else {
            glyph.to_lowercase()
        }
    }
}

/// Phase of a button's auto-repeat timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPhase {
    /// Not held, or a toggle button that never repeats.
    Idle,
    /// Held, waiting out the initial long delay.
    Delay,
    /// Held past the first firing; repeating on the short interval.
    Repeating,
}

/// Press-and-hold auto-repeat state machine.
///
/// Pressing arms the long initial delay; the first firing switches to
/// the short repeating interval; releasing cancels unconditionally,
/// even before the first firing. The deadlines themselves live in the
/// engine's run loop; this type only decides the next interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTimer {
    phase: RepeatPhase,
}

impl Default for RepeatTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RepeatTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RepeatPhase::Idle,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RepeatPhase {
        self.phase
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != RepeatPhase::Idle
    }

    /// Arms the timer on press. Returns the delay until the first
    /// firing, or `None` when the timer was already armed.
    pub fn press(&mut self) -> Option<std::time::Duration> {
        if self.is_active() {
            return None;
        }
        self.phase = RepeatPhase::Delay;
        Some(crate::app_settings::REPEAT_DELAY_LONG)
    }

    /// One firing. The first switches the long delay to the short
    /// repeating interval; every firing returns the delay until the
    /// next.
    pub fn fire(&mut self) -> std::time::Duration {
        debug_assert!(self.is_active(), "an idle timer cannot fire");
        self.phase = RepeatPhase::Repeating;
        crate::app_settings::REPEAT_DELAY_SHORT
    }

    /// Unconditional cancel on release, whether or not a firing ever
    /// happened.
    pub fn cancel(&mut self) {
        self.phase = RepeatPhase::Idle;
    }
}

// ============================================================================
// Tests
// ============================================================================
