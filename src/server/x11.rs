// SPDX-License-Identifier: GPL-3.0-only

//! X11 implementation of the input-server surface.
//!
//! One connection is opened at construction and held for the process
//! lifetime; opening a display per query at the 250 ms poll rate drains
//! X server resources. The connection is closed when the server is
//! dropped.
//!
//! Key events are synthesized through the XTest extension, keysym and
//! layout lookups go through the XKB keymap compiled from the server's
//! core keyboard device.

use std::collections::HashMap;

use xcb::{Xid, x};
use xkbcommon::xkb;

use super::{InputServer, KeyCode, Keysym, ServerError};
use crate::modifier::LockModifier;

// X protocol event codes fed to XTest FakeInput.
const KEY_PRESS_EVENT: u8 = 2;
const KEY_RELEASE_EVENT: u8 = 3;

/// Input server backed by a live X11 connection.
pub struct X11Server {
    conn: xcb::Connection,
    root: x::Window,
    keymap: xkb::Keymap,
    // Lock-modifier keycodes are static between keymap reloads, so
    // they are resolved once per compile instead of on every poll.
    lock_keycodes: HashMap<Keysym, Option<KeyCode>>,
    // Kept alive for the keymap; not queried after construction.
    _context: xkb::Context,
}

impl std::fmt::Debug for X11Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Server")
            .field("root", &self.root.resource_id())
            .finish_non_exhaustive()
    }
}

impl X11Server {
    /// Opens a connection to the default display and compiles the keymap
    /// of the core keyboard device.
    ///
    /// Fatal on failure: the engine cannot be constructed without a
    /// working connection.
    pub fn open() -> Result<Self, ServerError> {
        let (conn, screen_num) = xcb::Connection::connect_with_extensions(
            None,
            &[xcb::Extension::Xkb, xcb::Extension::Test],
            &[],
        )
        .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;

        let root = conn
            .get_setup()
            .roots()
            .nth(screen_num as usize)
            .ok_or_else(|| ServerError::ConnectionFailed("no screen on display".into()))?
            .root();

        // XKB handshake; the typed xkb requests below require it.
        let use_ext = conn
            .wait_for_reply(conn.send_request(&xcb::xkb::UseExtension {
                wanted_major: 1,
                wanted_minor: 0,
            }))
            .map_err(|e| ServerError::ExtensionMissing(e.to_string()))?;
        if !use_ext.supported() {
            return Err(ServerError::ExtensionMissing("XKB 1.0 not supported".into()));
        }

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let device_id = xkb::x11::get_core_keyboard_device_id(&conn);
        if device_id == -1 {
            return Err(ServerError::ExtensionMissing(
                "no core keyboard device".into(),
            ));
        }

        let keymap = xkb::x11::keymap_new_from_device(
            &context,
            &conn,
            device_id,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        );

        tracing::info!(device_id, "connected to X server, keymap compiled");

        let lock_keycodes = resolve_lock_keycodes(&keymap);
        Ok(Self {
            conn,
            root,
            keymap,
            lock_keycodes,
            _context: context,
        })
    }
}

/// Scans `keymap` for a keycode producing `keysym` at any level of any
/// layout.
fn scan_for_keysym(keymap: &xkb::Keymap, keysym: Keysym) -> Option<KeyCode> {
    let target = xkb::Keysym::new(keysym);
    let min = keymap.min_keycode().raw();
    let max = keymap.max_keycode().raw();

    for raw in min..=max {
        let code = xkb::Keycode::new(raw);
        for layout in 0..keymap.num_layouts_for_key(code) {
            for level in 0..keymap.num_levels_for_key(code, layout) {
                if keymap
                    .key_get_syms_by_level(code, layout, level)
                    .contains(&target)
                {
                    return Some(raw);
                }
            }
        }
    }
    None
}

/// Resolves the keycodes of all tracked lock modifiers in one pass over
/// a freshly compiled keymap.
fn resolve_lock_keycodes(keymap: &xkb::Keymap) -> HashMap<Keysym, Option<KeyCode>> {
    LockModifier::ALL
        .iter()
        .map(|modifier| {
            let keysym = modifier.query_keysym();
            (keysym, scan_for_keysym(keymap, keysym))
        })
        .collect()
}

impl InputServer for X11Server {
    fn input_focus(&self) -> Result<u32, ServerError> {
        let reply = self
            .conn
            .wait_for_reply(self.conn.send_request(&x::GetInputFocus {}))
            .map_err(|e| ServerError::RequestFailed(e.to_string()))?;
        Ok(reply.focus().resource_id())
    }

    fn keysym_at_level(&self, key_code: KeyCode, layout_index: u32, level: u32) -> Option<Keysym> {
        let syms =
            self.keymap
                .key_get_syms_by_level(xkb::Keycode::new(key_code), layout_index, level);
        match syms.first() {
            Some(sym) if sym.raw() != xkb::keysyms::KEY_NoSymbol => Some(sym.raw()),
            _ => None,
        }
    }

    fn keysym_to_text(&self, keysym: Keysym) -> String {
        // Dead keys and other non-text symbols come back empty; rendering
        // them blank is contractual, composition is unimplemented.
        let text = xkb::keysym_to_utf8(xkb::Keysym::new(keysym));
        text.trim_end_matches('\0').to_string()
    }

    fn keycode_for_keysym(&self, keysym: Keysym) -> Option<KeyCode> {
        scan_for_keysym(&self.keymap, keysym)
    }

    fn reload_keymap(&mut self) {
        let device_id = xkb::x11::get_core_keyboard_device_id(&self.conn);
        if device_id == -1 {
            tracing::warn!("core keyboard device vanished, keeping stale keymap");
            return;
        }
        self.keymap = xkb::x11::keymap_new_from_device(
            &self._context,
            &self.conn,
            device_id,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        );
        self.lock_keycodes = resolve_lock_keycodes(&self.keymap);
        tracing::debug!("keymap recompiled");
    }

    fn lock_state(&self, keysym: Keysym) -> bool {
        // Cached for the tracked lock modifiers; anything else falls
        // back to a full keymap scan.
        let resolved = match self.lock_keycodes.get(&keysym) {
            Some(cached) => *cached,
            None => self.keycode_for_keysym(keysym),
        };
        let Some(key_code) = resolved else {
            return false;
        };

        let map_cookie = self.conn.send_request(&x::GetModifierMapping {});
        let pointer_cookie = self.conn.send_request(&x::QueryPointer { window: self.root });

        let Ok(map) = self.conn.wait_for_reply(map_cookie) else {
            return false;
        };
        let Ok(pointer) = self.conn.wait_for_reply(pointer_cookie) else {
            return false;
        };

        // Only the first keycode of each modifier row is checked, same as
        // the classic XSetModifierMapping layouts provide. Not guaranteed
        // correct for exotic mappings.
        let per = usize::from(map.keycodes_per_modifier());
        let mut mask = 0u32;
        for row in 0..8 {
            if map.keycodes().get(row * per).copied() == Some(key_code as u8) {
                mask = 1 << row;
            }
        }

        (pointer.mask().bits() & mask) != 0
    }

    fn send_key_event(&mut self, key_code: KeyCode, press: bool) -> Result<(), ServerError> {
        self.conn
            .check_request(self.conn.send_request_checked(&xcb::xtest::FakeInput {
                r#type: if press { KEY_PRESS_EVENT } else { KEY_RELEASE_EVENT },
                detail: key_code as u8,
                time: x::CURRENT_TIME,
                root: self.root,
                root_x: 0,
                root_y: 0,
                deviceid: 0,
            }))
            .map_err(|e| ServerError::RequestFailed(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), ServerError> {
        self.conn
            .flush()
            .map_err(|e| ServerError::RequestFailed(e.to_string()))
    }
}
