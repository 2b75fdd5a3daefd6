// Category-based logging infrastructure
//
// This will be used from multiple threads, so it needs
// to be stateless

#[allow(dead_code, non_camel_case_types)]
#[derive(Copy, Clone)]
pub enum LogLevel {
    // in order of highest priority
    critical, // Urgent and must always be displayed
    error,
    debug,     // debugging related, fairly verbose
    verbose,   // more verbose debug output
    info,      // most verbose
    profiling, // profiling related timing, absurdly verbose
}

impl LogLevel {
    pub fn get_name(&self) -> &'static str {
        match self {
            LogLevel::critical => "critical",
            LogLevel::error => "error",
            LogLevel::debug => "debug",
            LogLevel::verbose => "verbose",
            LogLevel::info => "info",
            LogLevel::profiling => "profiling",
        }
    }

    pub fn get_level(&self) -> u32 {
        match self {
            LogLevel::critical => 0,
            LogLevel::error => 1,
            LogLevel::debug => 2,
            LogLevel::verbose => 3,
            LogLevel::info => 4,
            LogLevel::profiling => 5,
        }
    }
}

/// The level every build logs at, regardless of environment.
pub const DEFAULT_LEVEL: u32 = 1; // error

/// The active log level, read once from NEOCOMP_LOG.
pub fn active_level() -> u32 {
    lazy_static::lazy_static! {
        static ref LOG_LEVEL_RAW: u32 = match std::env::var("NEOCOMP_LOG") {
            Ok(val) => match val.as_str() {
                "debug" => LogLevel::debug.get_level(),
                "verbose" => LogLevel::verbose.get_level(),
                "info" => LogLevel::info.get_level(),
                "profiling" => LogLevel::profiling.get_level(),
                _ => DEFAULT_LEVEL,
            },
            Err(_) => DEFAULT_LEVEL,
        };
    }
    *LOG_LEVEL_RAW
}

/// If NEOCOMP_LOG_MATCH is set, only statements from files containing
/// the value are logged.
pub fn matches_filter(file: &str) -> bool {
    lazy_static::lazy_static! {
        static ref LOG_MATCH: Option<String> = std::env::var("NEOCOMP_LOG_MATCH").ok();
    }
    match &*LOG_MATCH {
        Some(m) => file.contains(m.as_str()),
        None => true,
    }
}

#[macro_export]
macro_rules! debug {
    ($($format_args:tt)+) => {{
        #[cfg(debug_assertions)]
        log::log_internal!(log::LogLevel::debug, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! verbose {
    ($($format_args:tt)+) => {{
        #[cfg(debug_assertions)]
        log::log_internal!(log::LogLevel::verbose, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! info {
    ($($format_args:tt)+) => {{
        #[cfg(debug_assertions)]
        log::log_internal!(log::LogLevel::info, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! error {
    ($($format_args:tt)+) => {{
        log::log_internal!(log::LogLevel::error, $($format_args)+)
    }};
}

#[allow(unused_macros)]
#[macro_export]
macro_rules! log_internal{
    ($loglevel:expr, $($format_args:tt)+) => ({
        let is_err = $loglevel.get_level() <= ::utils::logging::DEFAULT_LEVEL;
        let should_log = $loglevel.get_level() <= ::utils::logging::active_level()
            && ::utils::logging::matches_filter(file!());

        // If it is an error or our conditions are met then log it
        if is_err || should_log {
            let fmtstr = format!("[{:?}]<{}> {}:{} - {}",
                log::get_current_millis(),
                $loglevel.get_name(),
                file!(),
                line!(),
                format!($($format_args)+)
            );

            println!("{}", fmtstr);

            #[cfg(debug_assertions)]
            {
                // Append to a log file
                use std::fs::OpenOptions;
                use std::io::prelude::*;

                if let Ok(mut file) = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open("/tmp/neocomp_debug_log.txt")
                {
                    if let Err(e) = writeln!(file, "{}", fmtstr) {
                        eprintln!("Couldn't write to debug file: {}", e);
                    }
                }
            }
        }
    })
}
