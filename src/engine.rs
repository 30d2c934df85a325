// SPDX-License-Identifier: GPL-3.0-only

//! The keyboard-state synchronization engine.
//!
//! [`KeyboardEngine`] owns the input server, the layout registry, the
//! modifier tracker and the key synthesizer, and drives them from a
//! single-threaded run loop. Three timer-driven activities interleave
//! on that one thread:
//!
//! - the 250 ms modifier poll,
//! - one auto-repeat deadline per held button (multiple buttons may
//!   repeat simultaneously),
//! - inbound commands (button presses, layout-change refreshes from the
//!   D-Bus bridge).
//!
//! Mutual exclusion is structural: there are no locks, and the
//! synthesizer suspends the tracker for the duration of a send, which
//! suffices because no callback can run while another is executing.
//!
//! Consumers (the widget layer) receive [`EngineEvent`]s on a channel
//! and feed [`EngineCommand`]s in, mirroring the command-channel wiring
//! used for the D-Bus layer.

use std::collections::HashMap;

use futures::StreamExt;
use futures::channel::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::app_settings::{CHANNEL_CAPACITY, MODIFIER_POLL_INTERVAL};
use crate::button::RepeatTimer;
use crate::glyph::{self, GlyphSet};
use crate::layout::{Layout, LayoutRegistry};
use crate::modifier::{ModifierSnapshot, ModifierTracker};
use crate::server::{InputServer, KeyCode};
use crate::synth::KeySynthesizer;

/// Commands fed into the engine by the button layer and the layout
/// bridge.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// A button was pressed; synthesize its key. `repeat` arms the
    /// auto-repeat timer (toggle-style buttons pass `false`).
    KeyPressed { code: KeyCode, repeat: bool },
    /// The button was released; cancels its repeat timer
    /// unconditionally.
    KeyReleased(KeyCode),
    /// A toggle-style modifier button changed its checked state.
    SetModifierHeld { code: KeyCode, held: bool },
    /// Re-queried configured layout list (from the D-Bus bridge).
    LayoutListChanged(Vec<Layout>),
    /// Re-queried active layout index; `None` means the query failed.
    ActiveLayoutChanged(Option<u32>),
    /// Stop the run loop.
    Shutdown,
}

/// Outbound notifications to the widget layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The active layout changed; buttons must re-resolve their glyphs.
    LayoutUpdated { index: usize, short_id: String },
    /// A lock modifier flipped; carries the full new snapshot.
    ModifierStateChanged(ModifierSnapshot),
    /// A key synthesis delivered its events.
    KeySynthesisComplete(KeyCode),
}

/// Creates the engine command channel.
#[must_use]
pub fn command_channel() -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineCommand>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

#[derive(Debug)]
struct RepeatSchedule {
    timer: RepeatTimer,
    deadline: Instant,
}

/// The engine proper. Generic over the input server so tests can run
/// against a recording fake.
#[derive(Debug)]
pub struct KeyboardEngine<S: InputServer> {
    server: S,
    registry: LayoutRegistry,
    tracker: ModifierTracker,
    synthesizer: KeySynthesizer,
    repeats: HashMap<KeyCode, RepeatSchedule>,
    events: mpsc::Sender<EngineEvent>,
}

impl<S: InputServer> KeyboardEngine<S> {
    /// Builds the engine around an already-open server connection and
    /// returns it with the receiving end of its event channel.
    ///
    /// The initial modifier snapshot is taken here; the initial layout
    /// list arrives through the bridge's first commands.
    pub fn new(server: S) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let tracker = ModifierTracker::new(&server);
        let engine = Self {
            server,
            registry: LayoutRegistry::new(),
            tracker,
            synthesizer: KeySynthesizer::new(),
            repeats: HashMap::new(),
            events,
        };
        (engine, events_rx)
    }

    /// Borrow of the underlying server connection.
    #[must_use]
    pub fn server_ref(&self) -> &S {
        &self.server
    }

    /// Mutable borrow of the server, e.g. to reload the keymap.
    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    /// The active layout (placeholder while degraded).
    #[must_use]
    pub fn active_layout(&self) -> Layout {
        self.registry.active_layout()
    }

    /// The last accepted modifier snapshot.
    #[must_use]
    pub fn modifier_snapshot(&self) -> ModifierSnapshot {
        self.tracker.snapshot()
    }

    /// Resolves the glyph set for a key against the active layout.
    ///
    /// The registry reads its (list, index) pair in one synchronous
    /// call, so resolution never mixes an index from one list with
    /// entries of another.
    #[must_use]
    pub fn glyphs_for_key(&self, key_code: KeyCode) -> GlyphSet {
        glyph::resolve(&self.server, key_code, self.registry.active_index() as u32)
    }

    /// Runs the engine until `Shutdown` or until the command channel
    /// closes. Single-threaded; call from a current-thread runtime.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        // Startup emission order follows the engine's construction: the
        // consumers get a layout (possibly the placeholder) and the
        // initial lock state before the first poll tick.
        self.emit_layout_updated();
        self.emit(EngineEvent::ModifierStateChanged(self.tracker.snapshot()));

        let mut poll = tokio::time::interval(MODIFIER_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Far-future placeholder keeps the select arm inert while no
            // button repeats.
            let next_repeat = self.next_repeat_deadline();
            let repeat_sleep =
                next_repeat.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = commands.next() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = poll.tick() => self.poll_tick(),
                _ = tokio::time::sleep_until(repeat_sleep), if next_repeat.is_some() => {
                    self.fire_due_repeats();
                }
            }
        }

        tracing::debug!("engine run loop stopped");
    }

    /// Applies one command. Returns `false` on shutdown.
    pub fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::KeyPressed { code, repeat } => {
                if code == 0 {
                    tracing::warn!("press on an unbound button ignored");
                    return true;
                }
                self.synthesize_key(code);
                if repeat {
                    let schedule = self
                        .repeats
                        .entry(code)
                        .or_insert_with(|| RepeatSchedule {
                            timer: RepeatTimer::new(),
                            deadline: Instant::now(),
                        });
                    if let Some(delay) = schedule.timer.press() {
                        schedule.deadline = Instant::now() + delay;
                    }
                }
            }
            EngineCommand::KeyReleased(code) => {
                // Unconditional: cancels even if no repeat ever fired.
                if let Some(mut schedule) = self.repeats.remove(&code) {
                    schedule.timer.cancel();
                }
            }
            EngineCommand::SetModifierHeld { code, held } => {
                self.synthesizer.set_modifier_held(code, held);
            }
            EngineCommand::LayoutListChanged(layouts) => {
                // The configured set changed, so the compiled keymap is
                // stale; recompile before anything re-resolves glyphs.
                self.server.reload_keymap();
                // The bridge follows up with the re-queried active
                // index; the notification is emitted there.
                self.registry.replace_list(layouts);
            }
            EngineCommand::ActiveLayoutChanged(reply) => {
                self.registry.set_active(reply);
                self.emit_layout_updated();
            }
            EngineCommand::Shutdown => return false,
        }
        true
    }

    /// One modifier poll tick; skipped structurally while a synthesis
    /// is in flight (the tracker reports no change when suspended).
    pub fn poll_tick(&mut self) {
        if let Some(snapshot) = self.tracker.poll(&self.server) {
            self.emit(EngineEvent::ModifierStateChanged(snapshot));
        }
    }

    /// Earliest pending auto-repeat deadline, if any button is held.
    #[must_use]
    pub fn next_repeat_deadline(&self) -> Option<Instant> {
        self.repeats.values().map(|s| s.deadline).min()
    }

    fn fire_due_repeats(&mut self) {
        let now = Instant::now();
        let due: Vec<KeyCode> = self
            .repeats
            .iter()
            .filter(|(_, schedule)| schedule.deadline <= now)
            .map(|(&code, _)| code)
            .collect();

        for code in due {
            if let Some(schedule) = self.repeats.get_mut(&code) {
                let interval = schedule.timer.fire();
                schedule.deadline = now + interval;
            }
            self.synthesize_key(code);
        }
    }

    fn synthesize_key(&mut self, code: KeyCode) {
        let events = &mut self.events;
        let result = self.synthesizer.synthesize(
            &mut self.server,
            &mut self.tracker,
            code,
            |code| {
                if events
                    .try_send(EngineEvent::KeySynthesisComplete(code))
                    .is_err()
                {
                    tracing::warn!(code, "event channel full, completion dropped");
                }
            },
        );
        if let Err(e) = result {
            tracing::warn!("key synthesis failed: {}", e);
        }
    }

    fn emit_layout_updated(&mut self) {
        let layout = self.registry.active_layout();
        self.emit(EngineEvent::LayoutUpdated {
            index: self.registry.active_index(),
            short_id: layout.short_id,
        });
    }

    fn emit(&mut self, event: EngineEvent) {
        if self.events.try_send(event).is_err() {
            tracing::warn!("event channel full, notification dropped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::LockModifier;
    use crate::server::mock::{FakeEvent, MockServer};

    fn engine() -> (KeyboardEngine<MockServer>, mpsc::Receiver<EngineEvent>) {
        KeyboardEngine::new(MockServer::new())
    }

    fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            events.push(event);
        }
        events
    }

    /// A key press synthesizes immediately and reports completion.
    #[test]
    fn key_press_synthesizes_and_completes() {
        let (mut engine, mut rx) = engine();

        assert!(engine.handle_command(EngineCommand::KeyPressed {
            code: 38,
            repeat: false,
        }));

        assert_eq!(
            engine.server.events,
            vec![FakeEvent::press(38), FakeEvent::release(38)]
        );
        assert_eq!(drain(&mut rx), vec![EngineEvent::KeySynthesisComplete(38)]);
        assert_eq!(
            engine.next_repeat_deadline(),
            None,
            "non-repeating press must not arm a timer"
        );
    }

    /// Held modifiers set through commands wrap the synthesized key.
    #[test]
    fn held_modifiers_wrap_synthesis() {
        let (mut engine, _rx) = engine();

        engine.handle_command(EngineCommand::SetModifierHeld {
            code: 50,
            held: true,
        });
        engine.handle_command(EngineCommand::KeyPressed {
            code: 38,
            repeat: false,
        });

        assert_eq!(
            engine.server.events,
            vec![
                FakeEvent::press(50),
                FakeEvent::press(38),
                FakeEvent::release(38),
                FakeEvent::release(50),
            ]
        );
    }

    /// A repeating press arms a deadline; release cancels it even
    /// before the first firing.
    #[test]
    fn repeat_arming_and_unconditional_cancel() {
        let (mut engine, _rx) = engine();

        engine.handle_command(EngineCommand::KeyPressed {
            code: 65,
            repeat: true,
        });
        assert!(engine.next_repeat_deadline().is_some());

        engine.handle_command(EngineCommand::KeyReleased(65));
        assert_eq!(
            engine.next_repeat_deadline(),
            None,
            "release must cancel an un-fired repeat"
        );
    }

    /// Two held buttons repeat on independent deadlines.
    #[test]
    fn independent_repeat_timers_per_button() {
        let (mut engine, _rx) = engine();

        engine.handle_command(EngineCommand::KeyPressed {
            code: 65,
            repeat: true,
        });
        engine.handle_command(EngineCommand::KeyPressed {
            code: 38,
            repeat: true,
        });
        assert_eq!(engine.repeats.len(), 2);

        engine.handle_command(EngineCommand::KeyReleased(65));
        assert_eq!(engine.repeats.len(), 1, "only the released timer stops");
        assert!(engine.repeats.contains_key(&38));
    }

    /// A failed active-layout refresh reports the placeholder to
    /// consumers.
    #[test]
    fn failed_layout_refresh_reports_placeholder() {
        let (mut engine, mut rx) = engine();

        engine.handle_command(EngineCommand::LayoutListChanged(vec![
            Layout::new("us", "English (US)", ""),
            Layout::new("fr", "French", ""),
        ]));
        engine.handle_command(EngineCommand::ActiveLayoutChanged(Some(1)));
        engine.handle_command(EngineCommand::ActiveLayoutChanged(None));

        assert_eq!(
            drain(&mut rx),
            vec![
                EngineEvent::LayoutUpdated {
                    index: 1,
                    short_id: "fr".into(),
                },
                EngineEvent::LayoutUpdated {
                    index: 0,
                    short_id: "us".into(),
                },
            ]
        );
    }

    /// A layout-set change recompiles the keymap before the list swap,
    /// so glyph re-resolution never reads the old group arrangement.
    #[test]
    fn layout_list_change_recompiles_keymap() {
        let (mut engine, _rx) = engine();

        engine.handle_command(EngineCommand::LayoutListChanged(vec![
            Layout::new("us", "English (US)", ""),
            Layout::new("de", "German", ""),
        ]));
        assert_eq!(engine.server_ref().keymap_reloads, 1);

        // Active-index refreshes alone leave the keymap untouched.
        engine.handle_command(EngineCommand::ActiveLayoutChanged(Some(1)));
        assert_eq!(engine.server_ref().keymap_reloads, 1);

        engine.handle_command(EngineCommand::LayoutListChanged(vec![Layout::new(
            "de", "German", "",
        )]));
        assert_eq!(engine.server_ref().keymap_reloads, 2);
    }

    /// Glyph resolution follows the active layout index.
    #[test]
    fn glyphs_follow_active_layout() {
        let server = MockServer::new()
            .with_key(24, 0, [Some('q'), Some('Q'), None, None])
            .with_key(24, 1, [Some('a'), Some('A'), None, None]);
        let (mut engine, _rx) = KeyboardEngine::new(server);

        engine.handle_command(EngineCommand::LayoutListChanged(vec![
            Layout::new("us", "", ""),
            Layout::new("fr", "", ""),
        ]));
        engine.handle_command(EngineCommand::ActiveLayoutChanged(Some(0)));
        assert_eq!(engine.glyphs_for_key(24).get(0), Some("q"));

        engine.handle_command(EngineCommand::ActiveLayoutChanged(Some(1)));
        assert_eq!(engine.glyphs_for_key(24).get(0), Some("a"));
    }

    /// Poll ticks notify only on an actual lock change.
    #[test]
    fn poll_tick_notifies_only_on_change() {
        let (mut engine, mut rx) = engine();

        engine.poll_tick();
        assert!(drain(&mut rx).is_empty(), "idle poll must stay silent");

        engine
            .server
            .set_lock(LockModifier::CapsLock.query_keysym(), true);
        engine.poll_tick();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            EngineEvent::ModifierStateChanged(snapshot) if snapshot.capslock
        ));
    }

    /// Presses on the unbound sentinel are ignored without touching the
    /// server.
    #[test]
    fn unbound_press_is_ignored() {
        let (mut engine, mut rx) = engine();

        engine.handle_command(EngineCommand::KeyPressed {
            code: 0,
            repeat: true,
        });

        assert!(engine.server.events.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.next_repeat_deadline(), None);
    }

    /// The run loop emits the startup layout + modifier events and
    /// stops on Shutdown.
    #[tokio::test]
    async fn run_loop_startup_and_shutdown() {
        use futures::SinkExt;

        let (engine, mut rx) = engine();
        let (mut tx, commands) = command_channel();

        // Commands are buffered, so the loop drains them and stops.
        tx.send(EngineCommand::KeyPressed {
            code: 38,
            repeat: false,
        })
        .await
        .unwrap();
        tx.send(EngineCommand::Shutdown).await.unwrap();
        engine.run(commands).await;

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            EngineEvent::LayoutUpdated {
                index: 0,
                short_id: "us".into(),
            },
            "startup reports the placeholder layout"
        );
        assert!(matches!(events[1], EngineEvent::ModifierStateChanged(_)));
        assert!(
            events.contains(&EngineEvent::KeySynthesisComplete(38)),
            "the pressed key completed before shutdown"
        );
    }

    /// Auto-repeat fires after the long delay, then on the short
    /// interval, until release.
    #[tokio::test(start_paused = true)]
    async fn run_loop_repeats_until_release() {
        use futures::SinkExt;

        let (engine, mut rx) = engine();
        let (mut tx, commands) = command_channel();
        let run = tokio::spawn(engine.run(commands));

        tx.send(EngineCommand::KeyPressed {
            code: 65,
            repeat: true,
        })
        .await
        .unwrap();

        // First completion is the immediate press, the next two are the
        // long-delay firing and the first short-interval firing.
        let mut completions = 0;
        while completions < 3 {
            match rx.next().await {
                Some(EngineEvent::KeySynthesisComplete(65)) => completions += 1,
                Some(_) => {}
                None => panic!("event channel closed early"),
            }
        }

        tx.send(EngineCommand::KeyReleased(65)).await.unwrap();
        tx.send(EngineCommand::Shutdown).await.unwrap();
        run.await.unwrap();
    }
}
