use std::sync::Once;

use sable_shared::log::LevelFilter;

static LOGGER: Once = Once::new();

/// Installs a logger for the current test binary. Safe to call from every
/// test; only the first call has an effect.
pub fn setup_logger() {
    LOGGER.call_once(|| {
        simple_logger::SimpleLogger::new()
            .with_level(LevelFilter::Trace)
            .init()
            .expect("failed to install the test logger");
    });
}
