//! Logging support.
use once_cell::sync::OnceCell;
use slog::{o, Discard, Logger};

static ROOT_LOGGER: OnceCell<Logger> = OnceCell::new();

/// Install the root logger. Only the first call has an effect.
pub fn init(root: Logger) {
    let _ = ROOT_LOGGER.set(root);
}

/// Get the logger for the given module.
pub fn get_logger(module: &'static str) -> Logger {
    ROOT_LOGGER
        .get_or_init(|| Logger::root(Discard, o!()))
        .new(o!("module" => module))
}
