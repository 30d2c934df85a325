// SPDX-License-Identifier: GPL-3.0-only

//! Input-server abstraction.
//!
//! The engine never talks to X11 directly; it goes through the
//! [`InputServer`] trait, which covers exactly the query/command surface
//! the engine needs:
//!
//! - keysym lookup per (key code, layout, shift level)
//! - keysym to displayable text translation
//! - lock-modifier state queries
//! - synthesized key press/release events
//!
//! The production implementation is [`x11::X11Server`], which holds one
//! long-lived connection to the X server for the process lifetime. Tests
//! use a recording fake instead.

pub mod x11;

#[cfg(test)]
pub mod mock;

pub use x11::X11Server;

/// A physical key identifier in the input server's numbering.
///
/// Stable for the process lifetime. `0` is the reserved sentinel for
/// "no key bound" and is never sent to the server.
pub type KeyCode = u32;

/// A logical key symbol (X11 keysym), independent of display rendering.
pub type Keysym = u32;

/// Errors raised by the input-server connection.
///
/// Connection-level failures are fatal at startup: the engine cannot
/// exist without a server. Per-request failures after startup are
/// reported but the engine keeps running.
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Could not open a connection to the input server.
    ConnectionFailed(String),
    /// A required server extension (XKB, XTest) is unavailable.
    ExtensionMissing(String),
    /// A request on an established connection failed.
    RequestFailed(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::ConnectionFailed(msg) => {
                write!(f, "input server connection failed: {}", msg)
            }
            ServerError::ExtensionMissing(msg) => {
                write!(f, "input server extension missing: {}", msg)
            }
            ServerError::RequestFailed(msg) => {
                write!(f, "input server request failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ServerError {}

/// Query/command surface of the underlying input server.
///
/// Implementations are synchronous: the engine is single-threaded and a
/// hung server query blocking the thread is an accepted risk, not
/// mitigated here.
pub trait InputServer {
    /// Returns the window currently holding input focus.
    ///
    /// The synthesizer reads this once before sending events as a
    /// round-trip sync point; the value itself is informational.
    fn input_focus(&self) -> Result<u32, ServerError>;

    /// Returns the keysym produced by `key_code` under `layout_index` at
    /// shift `level` (0 = unshifted, 1 = shift, 2 = level-3,
    /// 3 = level-3+shift), or `None` when the position is unmapped.
    fn keysym_at_level(&self, key_code: KeyCode, layout_index: u32, level: u32) -> Option<Keysym>;

    /// Translates a keysym to displayable text.
    ///
    /// Returns an empty string for symbols with no text form. Dead-key
    /// symbols translate to the empty string; composing them is out of
    /// scope and the blank glyph is contractual.
    fn keysym_to_text(&self, keysym: Keysym) -> String;

    /// Finds a key code that produces `keysym` at some level of some
    /// layout, or `None` when the current keymap cannot produce it.
    fn keycode_for_keysym(&self, keysym: Keysym) -> Option<KeyCode>;

    /// Returns the lock state of the modifier bound to `keysym`.
    ///
    /// Resolved through the server's modifier-keycode mapping and the
    /// pointer modifier mask. Returns `false` when the keysym is not
    /// bound to any modifier, mirroring an unlocked state.
    fn lock_state(&self, keysym: Keysym) -> bool;

    /// Recompiles cached keymap state after the configured layout set
    /// changed, so level lookups see the new group arrangement.
    ///
    /// Default is a no-op for servers without compiled state.
    fn reload_keymap(&mut self) {}

    /// Synthesizes one key press (`press == true`) or release event.
    fn send_key_event(&mut self, key_code: KeyCode, press: bool) -> Result<(), ServerError>;

    /// Flushes buffered synthesized events to the server.
    fn flush(&mut self) -> Result<(), ServerError>;
}
