//! Logging infrastructure - structured tracing for descriptor builds and calls
//!
//! Uses `tracing` for structured, contextual logging with:
//! - Configurable level, overridable through `RUST_LOG`
//! - Zero-cost when disabled (the call path only emits at `trace`/`debug`)
//! - Optional JSON output and file output via `tracing-appender`

use std::io;
use std::path::Path;

use libffi::raw::ffi_abi;
use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use tracing::{debug, error, info, trace, warn};

use crate::errors::FfiError;
use crate::interop::TypeCode;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the file writer flushing for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Parse a level name; case-insensitive
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DLCALL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("DLCALL_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // DLCALL_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("DLCALL_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("DLCALL_LOG_JSON").is_ok();
        config.show_spans = std::env::var("DLCALL_LOG_SPANS").is_ok();

        config
    }

    /// Minimal logging for hot call loops
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Verbose logging, every call traced to `dlcall.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("dlcall.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. If the host application has
/// already installed its own, that one stays in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("dlcall={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

        let console = fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(span_events.clone())
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));
        if config.json_format {
            layers.push(console.json().boxed());
        } else {
            layers.push(console.boxed());
        }

        if let Some(path) = config.log_path.as_deref().filter(|_| config.file_output) {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let _ = FILE_GUARD.set(guard);

            let file = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(span_events);
            if config.json_format {
                layers.push(file.json().boxed());
            } else {
                layers.push(file.boxed());
            }
        }

        let _ = tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Call-path logging functions
// ============================================================================

/// Log a successfully prepared call interface
#[inline]
pub fn log_cif_prepared(arg_count: usize, ret: TypeCode, abi: ffi_abi, frame_bytes: usize) {
    debug!(
        event = "cif_prepared",
        args = arg_count,
        ret = %ret,
        abi = abi,
        frame_bytes = frame_bytes,
        "Call interface prepared"
    );
}

/// Log a signature rejected by `ffi_prep_cif`
pub fn log_cif_rejected(arg_count: usize, abi: ffi_abi, status: u32) {
    debug!(
        event = "cif_rejected",
        args = arg_count,
        abi = abi,
        status = status,
        "Call interface rejected"
    );
}

/// Log native call entry
#[inline]
pub fn log_ffi_call(target: usize, arg_count: usize) {
    trace!(
        event = "ffi_call",
        target = ?(target as *const ()),
        args = arg_count,
        "Native routine called"
    );
}

/// Log native call return with the captured errno
#[inline]
pub fn log_ffi_return(target: usize, errno: i32) {
    trace!(
        event = "ffi_return",
        target = ?(target as *const ()),
        errno = errno,
        "Native routine returned"
    );
}

/// Log a failed invocation
pub fn log_ffi_error(fn_name: &str, error: &FfiError) {
    warn!(
        event = "ffi_error",
        function = fn_name,
        phase = %error.phase(),
        error = %error,
        "Native call failed"
    );
}

/// Log a loaded library
pub fn log_library_open(name: &str) {
    info!(event = "library_open", library = name, "Library loaded");
}
