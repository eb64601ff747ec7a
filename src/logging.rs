//! Log output for the extension.
//!
//! All modules log through the `log` facade. The host shim calls [`init`]
//! once at activation; the filter defaults to `info` and honours `RUST_LOG`.

use env_logger::Env;

/// Installs the `env_logger` backend.
///
/// Returns `false` when a logger was already installed, which is not an error:
/// hosts may activate the extension more than once per process.
pub fn init() -> bool {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .try_init()
        .is_ok()
}

/// Installs a logger that writes through the test harness capture.
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
