// SPDX-License-Identifier: GPL-3.0-only

//! Centralized engine settings and constants.

use std::time::Duration;

/// Application ID in RDNN (reverse domain name notation) format.
pub const APP_ID: &str = "io.github.xvkb.Xvkb";

/// Period of the modifier lock-state poll.
///
/// Polling faster than this drains X server resources for no visible
/// benefit; 4 Hz is enough for lock-LED style feedback.
pub const MODIFIER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Delay before the first auto-repeat of a held key.
///
/// Slightly more than the time a single click takes, so a plain tap
/// never repeats.
pub const REPEAT_DELAY_LONG: Duration = Duration::from_millis(200);

/// Interval between auto-repeats once a key is established as held.
pub const REPEAT_DELAY_SHORT: Duration = Duration::from_millis(40);

/// Well-known name of the session service that owns keyboard layouts.
pub const LAYOUTS_SERVICE: &str = "org.kde.keyboard";

/// Object path of the layouts interface.
pub const LAYOUTS_PATH: &str = "/Layouts";

/// Interface name for layout list/active-index queries and change signals.
pub const LAYOUTS_INTERFACE: &str = "org.kde.KeyboardLayouts";

/// Short identifier reported while the layout service is unreachable or
/// its reply is invalid.
pub const PLACEHOLDER_LAYOUT: &str = "us";

/// Capacity of the engine command and event channels.
pub const CHANNEL_CAPACITY: usize = 64;
