// SPDX-License-Identifier: GPL-3.0-only

//! Recording fake for the input-server surface, test builds only.
//!
//! Serves a synthetic keysym table (with per-level gaps to exercise the
//! fallback policy) and records every synthesized event in order.

use std::cell::Cell;
use std::collections::HashMap;

use super::{InputServer, KeyCode, Keysym, ServerError};

/// One synthesized press or release recorded by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeEvent {
    pub code: KeyCode,
    pub press: bool,
}

impl FakeEvent {
    pub fn press(code: KeyCode) -> Self {
        Self { code, press: true }
    }

    pub fn release(code: KeyCode) -> Self {
        Self { code, press: false }
    }
}

/// In-memory input server for tests.
#[derive(Debug, Default)]
pub struct MockServer {
    keysyms: HashMap<(KeyCode, u32, u32), Keysym>,
    texts: HashMap<Keysym, String>,
    locks: HashMap<Keysym, bool>,
    /// Every key event sent, in send order.
    pub events: Vec<FakeEvent>,
    /// Number of flushes issued.
    pub flushes: usize,
    /// Number of keymap recompilations requested.
    pub keymap_reloads: usize,
    focus_reads: Cell<usize>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a key position to a keysym.
    pub fn set_keysym(&mut self, code: KeyCode, layout: u32, level: u32, keysym: Keysym) {
        self.keysyms.insert((code, layout, level), keysym);
    }

    /// Binds the four levels of a key at once; `None` leaves a gap.
    ///
    /// Characters are used as their own keysyms, which matches X11 for
    /// the Latin-1 range the tests stick to.
    pub fn with_key(mut self, code: KeyCode, layout: u32, levels: [Option<char>; 4]) -> Self {
        for (level, ch) in levels.into_iter().enumerate() {
            if let Some(ch) = ch {
                self.set_keysym(code, layout, level as u32, ch as Keysym);
            }
        }
        self
    }

    /// Overrides the text form of a keysym (e.g. to model a dead key
    /// translating to nothing).
    pub fn set_text(&mut self, keysym: Keysym, text: &str) {
        self.texts.insert(keysym, text.to_string());
    }

    /// Sets the lock state reported for a modifier keysym.
    pub fn set_lock(&mut self, keysym: Keysym, locked: bool) {
        self.locks.insert(keysym, locked);
    }

    /// Number of input-focus sync reads performed.
    pub fn focus_reads(&self) -> usize {
        self.focus_reads.get()
    }
}

impl InputServer for MockServer {
    fn input_focus(&self) -> Result<u32, ServerError> {
        self.focus_reads.set(self.focus_reads.get() + 1);
        Ok(0)
    }

    fn keysym_at_level(&self, key_code: KeyCode, layout_index: u32, level: u32) -> Option<Keysym> {
        self.keysyms.get(&(key_code, layout_index, level)).copied()
    }

    fn keysym_to_text(&self, keysym: Keysym) -> String {
        if let Some(text) = self.texts.get(&keysym) {
            return text.clone();
        }
        char::from_u32(keysym)
            .filter(|c| !c.is_control())
            .map(String::from)
            .unwrap_or_default()
    }

    fn keycode_for_keysym(&self, keysym: Keysym) -> Option<KeyCode> {
        self.keysyms
            .iter()
            .filter(|&(_, &sym)| sym == keysym)
            .map(|((code, _, _), _)| *code)
            .min()
    }

    fn lock_state(&self, keysym: Keysym) -> bool {
        self.locks.get(&keysym).copied().unwrap_or(false)
    }

    fn reload_keymap(&mut self) {
        self.keymap_reloads += 1;
    }

    fn send_key_event(&mut self, key_code: KeyCode, press: bool) -> Result<(), ServerError> {
        self.events.push(FakeEvent {
            code: key_code,
            press,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ServerError> {
        self.flushes += 1;
        Ok(())
    }
}
