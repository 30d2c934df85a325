// SPDX-License-Identifier: GPL-3.0-only

//! Key synthesis: press/release emission with held modifiers.
//!
//! The synthesizer owns the set of currently-active modifier keys (the
//! on-screen toggle buttons report changes through
//! [`KeySynthesizer::set_modifier_held`]; the engine never introspects
//! widgets). A synthesis is strictly sequential:
//!
//! 1. suspend the modifier tracker,
//! 2. assert every held modifier key (press, no release),
//! 3. press then release the target key,
//! 4. release the held modifiers in the same enumeration order,
//! 5. resume the tracker.
//!
//! The held set is read once per synthesis and reused for both passes,
//! so a modifier toggled mid-synthesis can never produce an
//! assert/release mismatch. Completion is reported once the events are
//! flushed, before the tracker resumes.

use crate::modifier::ModifierTracker;
use crate::server::{InputServer, KeyCode, ServerError};

/// Errors raised by a synthesis attempt.
#[derive(Debug, Clone)]
pub enum SynthError {
    /// Key code 0 is the "no key bound" sentinel; synthesizing it is a
    /// caller contract violation.
    UnboundKey,
    /// The input server rejected an event.
    Server(ServerError),
}

impl std::fmt::Display for SynthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthError::UnboundKey => write!(f, "cannot synthesize the unbound key code 0"),
            SynthError::Server(err) => write!(f, "key synthesis failed: {}", err),
        }
    }
}

impl std::error::Error for SynthError {}

impl From<ServerError> for SynthError {
    fn from(err: ServerError) -> Self {
        SynthError::Server(err)
    }
}

/// Emits synthesized key events with the held modifiers asserted.
#[derive(Debug, Clone, Default)]
pub struct KeySynthesizer {
    /// Held modifier keys in activation order. Order is preserved for
    /// both the assert and release passes.
    held_modifiers: Vec<KeyCode>,
}

impl KeySynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a modifier-role key as held or released.
    ///
    /// Called by the button layer when a toggle-style modifier button
    /// changes its checked state. Re-holding an already held key is a
    /// no-op; its position in the enumeration order is kept.
    pub fn set_modifier_held(&mut self, key_code: KeyCode, held: bool) {
        if key_code == 0 {
            debug_assert!(false, "modifier buttons must carry a real key code");
            return;
        }
        if held {
            if !self.held_modifiers.contains(&key_code) {
                self.held_modifiers.push(key_code);
            }
        } else {
            self.held_modifiers.retain(|&code| code != key_code);
        }
    }

    /// The currently held modifier keys, in enumeration order.
    #[must_use]
    pub fn held_modifiers(&self) -> &[KeyCode] {
        &self.held_modifiers
    }

    /// Synthesizes a press+release of `key_code` with the held modifiers
    /// asserted around it.
    ///
    /// The tracker is suspended for the duration and resumed on every
    /// exit path. `on_complete` runs after the key events are flushed
    /// and before the tracker resumes.
    pub fn synthesize<S, F>(
        &self,
        server: &mut S,
        tracker: &mut ModifierTracker,
        key_code: KeyCode,
        on_complete: F,
    ) -> Result<(), SynthError>
    where
        S: InputServer,
        F: FnOnce(KeyCode),
    {
        if key_code == 0 {
            debug_assert!(false, "synthesize called with the unbound key code");
            return Err(SynthError::UnboundKey);
        }

        tracker.suspend();

        // One read of the held set serves both passes below.
        let held = self.held_modifiers.clone();
        let result = Self::send_sequence(server, &held, key_code);

        if result.is_ok() {
            on_complete(key_code);
        }
        tracker.resume();
        result
    }

    fn send_sequence<S: InputServer>(
        server: &mut S,
        held: &[KeyCode],
        key_code: KeyCode,
    ) -> Result<(), SynthError> {
        // Round-trip sync point before touching modifier state; the
        // focus window itself is not used.
        let _ = server.input_focus();

        for &modifier in held {
            server.send_key_event(modifier, true)?;
        }

        server.send_key_event(key_code, true)?;
        server.send_key_event(key_code, false)?;

        for &modifier in held {
            server.send_key_event(modifier, false)?;
        }

        server.flush()?;
        tracing::debug!(key_code, modifiers = held.len(), "key synthesized");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
