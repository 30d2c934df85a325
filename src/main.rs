// SPDX-License-Identifier: GPL-3.0-only

//! Xvkb Main Entry Point
//!
//! Opens the X server connection, starts the keyboard engine on a
//! current-thread runtime, and bridges the desktop's keyboard-layout
//! daemon into it. The widget layer attaches to the engine's command
//! and event channels; here the events are only logged.

use std::process::ExitCode;

use futures::StreamExt;

use xvkb::app_settings;
use xvkb::dbus::{self, LayoutService};
use xvkb::engine::{self, EngineEvent, KeyboardEngine};
use xvkb::server::X11Server;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xvkb=info".parse().unwrap()),
        )
        .init();

    tracing::info!(app_id = app_settings::APP_ID, "starting");

    // Without a display there is nothing to synthesize into or poll.
    let server = match X11Server::open() {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("cannot open the X display: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (engine, mut events) = KeyboardEngine::new(server);
    let (commands, commands_rx) = engine::command_channel();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            // The layout daemon is optional: without it the engine
            // stays on the fallback layout.
            match LayoutService::connect().await {
                Ok(service) => {
                    tokio::task::spawn_local(dbus::run_layout_bridge(service, commands.clone()));
                }
                Err(e) => {
                    tracing::warn!("layout daemon unavailable, using the fallback layout: {}", e);
                }
            }

            tokio::task::spawn_local(async move {
                while let Some(event) = events.next().await {
                    match event {
                        EngineEvent::LayoutUpdated { index, short_id } => {
                            tracing::info!(index, %short_id, "active layout changed");
                        }
                        EngineEvent::ModifierStateChanged(snapshot) => {
                            tracing::debug!(?snapshot, "lock modifiers changed");
                        }
                        EngineEvent::KeySynthesisComplete(code) => {
                            tracing::trace!(code, "key delivered");
                        }
                    }
                }
            });

            // Held so the command channel stays open for the engine's
            // whole lifetime even if the bridge exits.
            let _commands = commands;
            engine.run(commands_rx).await;
        })
        .await;

    ExitCode::SUCCESS
}
