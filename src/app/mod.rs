pub(crate) mod config_runtime;
pub(crate) mod credentials;
pub(crate) mod exit_handler;
pub(crate) mod progress_display;
pub(crate) mod runtime;
pub(crate) mod terminal;
