//! Optional local trace logging; never touches the relayed descriptors.

use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

const TRACE_LOG_ENV: &str = "PTYSHIM_TRACE_LOG";
const TRACE_LOG_FILE_NAME: &str = "ptyshim_trace.jsonl";

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static CONTENT_LOGGING: AtomicBool = AtomicBool::new(false);

pub fn tracing_log_path() -> PathBuf {
    env::var(TRACE_LOG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join(TRACE_LOG_FILE_NAME))
}

/// Whether log lines may include text received from the caller.
pub(crate) fn content_logging_enabled() -> bool {
    CONTENT_LOGGING.load(Ordering::Relaxed)
}

fn init_tracing_once(config: &AppConfig, once: &OnceLock<()>) {
    CONTENT_LOGGING.store(config.content_logging_enabled(), Ordering::Relaxed);
    if !config.logging_enabled() {
        return;
    }

    let _ = once.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_max_level(tracing::Level::TRACE)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Install the JSON file subscriber when logging is enabled.
///
/// Must run after the control descriptor has been probed so the log file can
/// never occupy its slot.
pub fn init_tracing(config: &AppConfig) {
    init_tracing_once(config, &TRACING_INIT);
}
