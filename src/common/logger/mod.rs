use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::configs::LoggingConfig;

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<CircularFileWriter> = OnceLock::new();

/// `println!` that also lands in the log file once logging is up.
#[macro_export]
macro_rules! log_println {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

pub fn append_to_file_raw(msg: &str) {
    if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
        use std::io::Write;
        let clean_msg = strip_ansi_escapes(msg);
        let _ = writer.write_all(clean_msg.as_bytes());
    }
}

/// Builds the filter directive string; gateway and voice crates are noisy
/// at `info` so they are capped at `warn` unless overridden.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let level = config.level.as_deref().unwrap_or("info");
    let base = format!("{level},serenity=warn,songbird=warn,tracing::span=warn");
    match config.filters.as_deref() {
        Some(extra) if !extra.trim().is_empty() => format!("{base},{extra}"),
        _ => base,
    }
}

pub fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let stdout_layer = fmt::layer()
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    let file_layer = config.file.as_ref().map(|file_config| {
        if let Some(parent) = Path::new(&file_config.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {}", e);
            }
        }

        let writer = CircularFileWriter::new(file_config.path.clone(), file_config.max_lines);
        let _ = GLOBAL_FILE_WRITER.set(writer.clone());
        fmt::layer()
            .with_writer(writer)
            .event_format(CustomFormatter::new(false))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
