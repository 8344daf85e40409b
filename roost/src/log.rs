// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use log::LevelFilter;

/// Process wide log verbosity of the client library.
///
/// Initialized once at client construction; a pure leaf which is not
/// consulted by the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// No log output at all.
    #[default]
    Silent,

    Error,

    Warning,

    Info,

    Debug,

    /// Most detailed level, includes per-packet traces.
    Verbose,
}

const fn get_log_level(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Silent => LevelFilter::Off,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warning => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Verbose => LevelFilter::Trace,
    }
}

/// Initialize the process logger with `level`.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_log(level: LogLevel) {
    let _ret = env_logger::Builder::new()
        .filter_level(get_log_level(level))
        .try_init();
}
