//! MIDI to OSC bridge for Allen & Heath mixers.
//!
//! Raw MIDI from the desk is queued, decoded into parameter changes and SysEx
//! commands, mapped through a JSON template table and sent to every
//! configured OSC target.

pub mod config;
pub mod error;
pub mod general;
pub mod io;
pub mod midi;
pub mod remote;
pub mod template;

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;

pub use error::{Error, Result};

/// Set by the console handler to request shutdown.
pub static EXIT_FLAG: AtomicBool = AtomicBool::new(false);

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

/// Raise the log level to debug, or drop back to the configured level.
pub fn set_debug_enabled(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    let base = config::get_config().log_level().unwrap_or(LevelFilter::Info);
    log::set_max_level(if enabled { base.max(LevelFilter::Debug) } else { base });
}
