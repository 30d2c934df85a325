// SPDX-License-Identifier: GPL-3.0-only

//! Lock-modifier state tracking.
//!
//! The input server has no event-push API for lock modifiers, so the
//! tracker polls on a fixed 250 ms period and diffs each result against
//! its last snapshot. A change notification carries the full new
//! snapshot, never a diff; identical polls are discarded silently to
//! avoid broadcast storms at 4 Hz when the system is idle.
//!
//! The tracker is a two-state machine: POLLING and SUSPENDED. Key
//! synthesis suspends it for the duration of a send so the poll never
//! observes the synthesizer's transient modifier presses.

use xkbcommon::xkb::keysyms::{KEY_Alt_R, KEY_Caps_Lock, KEY_Num_Lock};

use crate::server::{InputServer, Keysym};

/// The lock modifiers the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockModifier {
    CapsLock,
    NumLock,
    Level3Shift,
}

impl LockModifier {
    /// All tracked lock modifiers, in snapshot order.
    pub const ALL: [LockModifier; 3] = [
        LockModifier::CapsLock,
        LockModifier::NumLock,
        LockModifier::Level3Shift,
    ];

    /// The keysym whose modifier bit is queried for this lock.
    ///
    /// There is no direct lock query for level-3-shift, so it is
    /// approximated via the Alt_R modifier bit. Documented
    /// approximation, not guaranteed correct on all layouts.
    #[must_use]
    pub fn query_keysym(self) -> Keysym {
        match self {
            LockModifier::CapsLock => KEY_Caps_Lock,
            LockModifier::NumLock => KEY_Num_Lock,
            LockModifier::Level3Shift => KEY_Alt_R,
        }
    }
}

/// Lock state of all tracked modifiers at one poll instant.
///
/// Replaced wholesale on every accepted poll; never partially mutated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierSnapshot {
    pub capslock: bool,
    pub numlock: bool,
    pub level3_shift: bool,
}

impl ModifierSnapshot {
    /// Lock state by modifier name.
    #[must_use]
    pub fn get(&self, modifier: LockModifier) -> bool {
        match modifier {
            LockModifier::CapsLock => self.capslock,
            LockModifier::NumLock => self.numlock,
            LockModifier::Level3Shift => self.level3_shift,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Polling,
    Suspended,
}

/// Polls and diffs lock-modifier state against the input server.
#[derive(Debug)]
pub struct ModifierTracker {
    state: TrackerState,
    snapshot: ModifierSnapshot,
}

impl ModifierTracker {
    /// Creates the tracker and takes the initial snapshot.
    pub fn new<S: InputServer>(server: &S) -> Self {
        Self {
            state: TrackerState::Polling,
            snapshot: Self::query(server),
        }
    }

    fn query<S: InputServer>(server: &S) -> ModifierSnapshot {
        ModifierSnapshot {
            capslock: server.lock_state(LockModifier::CapsLock.query_keysym()),
            numlock: server.lock_state(LockModifier::NumLock.query_keysym()),
            level3_shift: server.lock_state(LockModifier::Level3Shift.query_keysym()),
        }
    }

    /// The last accepted snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ModifierSnapshot {
        self.snapshot
    }

    /// POLLING -> SUSPENDED; entered when a key synthesis begins.
    pub fn suspend(&mut self) {
        self.state = TrackerState::Suspended;
    }

    /// SUSPENDED -> POLLING; entered when the synthesis completes.
    pub fn resume(&mut self) {
        self.state = TrackerState::Polling;
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.state == TrackerState::Suspended
    }

    /// One poll tick.
    ///
    /// Returns the full new snapshot when at least one lock bit flipped
    /// since the previous one, `None` otherwise. Always `None` while
    /// suspended: a synthesis is in flight and the result would be
    /// polluted by its held modifiers.
    pub fn poll<S: InputServer>(&mut self, server: &S) -> Option<ModifierSnapshot> {
        if self.is_suspended() {
            return None;
        }

        let current = Self::query(server);
        if current == self.snapshot {
            return None;
        }

        tracing::debug!(?current, "lock modifier state changed");
        self.snapshot = current;
        Some(current)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::mock::MockServer;

    /// An idle poll (no lock bit changed) emits nothing.
    #[test]
    fn unchanged_poll_is_silent() {
        let server = MockServer::new();
        let mut tracker = ModifierTracker::new(&server);

        assert_eq!(
            tracker.poll(&server),
            None,
            "no notification when no lock bit flipped"
        );
        assert_eq!(tracker.poll(&server), None);
    }

    /// A single flipped flag produces one notification carrying the full
    /// three-entry snapshot.
    #[test]
    fn single_flag_change_notifies_full_snapshot() {
        let mut server = MockServer::new();
        let mut tracker = ModifierTracker::new(&server);

        server.set_lock(LockModifier::CapsLock.query_keysym(), true);

        let snapshot = tracker.poll(&server).expect("change must notify");
        assert!(snapshot.capslock);
        assert!(!snapshot.numlock, "snapshot carries all entries, not a diff");
        assert!(!snapshot.level3_shift);

        // The same state again is silent.
        assert_eq!(tracker.poll(&server), None);
    }

    /// All three flags flipping at once still produce exactly one
    /// notification.
    #[test]
    fn all_flags_change_notifies_once() {
        let mut server = MockServer::new();
        let mut tracker = ModifierTracker::new(&server);

        server.set_lock(LockModifier::CapsLock.query_keysym(), true);
        server.set_lock(LockModifier::NumLock.query_keysym(), true);
        server.set_lock(LockModifier::Level3Shift.query_keysym(), true);

        let snapshot = tracker.poll(&server).expect("change must notify");
        assert_eq!(
            snapshot,
            ModifierSnapshot {
                capslock: true,
                numlock: true,
                level3_shift: true,
            }
        );
        assert_eq!(tracker.poll(&server), None, "one change, one notification");
    }

    /// A suspended tracker never polls, even across a real change; the
    /// change is picked up after resume.
    #[test]
    fn suspension_defers_detection() {
        let mut server = MockServer::new();
        let mut tracker = ModifierTracker::new(&server);

        tracker.suspend();
        assert!(tracker.is_suspended());

        server.set_lock(LockModifier::NumLock.query_keysym(), true);
        assert_eq!(tracker.poll(&server), None, "suspended tracker is silent");

        tracker.resume();
        let snapshot = tracker.poll(&server).expect("resumed tracker catches up");
        assert!(snapshot.numlock);
    }

    /// Snapshot lookup by modifier name.
    #[test]
    fn snapshot_lookup_by_name() {
        let snapshot = ModifierSnapshot {
            capslock: true,
            numlock: false,
            level3_shift: true,
        };

        assert!(snapshot.get(LockModifier::CapsLock));
        assert!(!snapshot.get(LockModifier::NumLock));
        assert!(snapshot.get(LockModifier::Level3Shift));
    }
}
