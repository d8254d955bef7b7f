//! Layer configuration.
//!
//! Read once when an instance is created, from the environment. All
//! options have defaults that keep the layer usable without any setup.

use std::env;
use std::path::PathBuf;

use bitflags::bitflags;

use crate::report::ReportFlags;

pub const REPORT_FLAGS_ENV: &str = "MEM_TRACKER_REPORT_FLAGS";
pub const DEBUG_ACTION_ENV: &str = "MEM_TRACKER_DEBUG_ACTION";
pub const LOG_FILENAME_ENV: &str = "MEM_TRACKER_LOG_FILENAME";

bitflags! {
    /// What to do with diagnostics that pass the severity filter.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct DebugAction: u32 {
        /// Write formatted lines to the log file (or standard error).
        const LOG_MSG = 1 << 0;
        /// Forward diagnostics as `tracing` events.
        const DEBUG_OUTPUT = 1 << 1;
        /// Accepted for compatibility; the core never traps into a
        /// debugger itself.
        const BREAK = 1 << 2;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub report_flags: ReportFlags,
    pub debug_action: DebugAction,
    /// `None` means standard error.
    pub log_filename: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_flags: ReportFlags::WARN | ReportFlags::ERROR,
            debug_action: DebugAction::LOG_MSG,
            log_filename: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Unknown or malformed values fall back to the defaults rather than
    /// failing instance creation.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var(REPORT_FLAGS_ENV) {
            if let Some(flags) = parse_report_flags(&value) {
                config.report_flags = flags;
            }
        }

        if let Ok(value) = env::var(DEBUG_ACTION_ENV) {
            if let Some(action) = parse_debug_action(&value) {
                config.debug_action = action;
            }
        }

        if let Ok(value) = env::var(LOG_FILENAME_ENV) {
            if !value.is_empty() && value != "stderr" {
                config.log_filename = Some(PathBuf::from(value));
            }
        }

        config
    }
}

fn parse_report_flags(value: &str) -> Option<ReportFlags> {
    let mut flags = ReportFlags::empty();
    for part in value.split(',') {
        match part.trim().to_ascii_lowercase().as_str() {
            "" => continue,
            "info" => flags |= ReportFlags::INFO,
            "warn" | "warning" => flags |= ReportFlags::WARN,
            "error" => flags |= ReportFlags::ERROR,
            "all" => flags = ReportFlags::all(),
            _ => return None,
        }
    }
    Some(flags)
}

fn parse_debug_action(value: &str) -> Option<DebugAction> {
    let mut action = DebugAction::empty();
    for part in value.split(',') {
        match part.trim().to_ascii_lowercase().as_str() {
            "" => continue,
            "log" | "log_msg" => action |= DebugAction::LOG_MSG,
            "debug_output" | "trace" => action |= DebugAction::DEBUG_OUTPUT,
            "break" => action |= DebugAction::BREAK,
            "none" => {}
            _ => return None,
        }
    }
    Some(action)
}
