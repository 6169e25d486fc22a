//! Logger setup for native and browser builds.

use log::LevelFilter;

/// Install the platform logger at `level`.
///
/// Uses `env_logger` natively (so `RUST_LOG` still overrides) and
/// `console_log` in the browser. Calling it again is harmless: the first
/// logger stays and only the max level is updated.
pub fn init(level: LevelFilter) {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let result = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init();
        if result.is_err() {
            log::set_max_level(level);
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        match level.to_level() {
            Some(max) => {
                if console_log::init_with_level(max).is_err() {
                    log::set_max_level(level);
                }
            }
            None => log::set_max_level(LevelFilter::Off),
        }
    }

    log::debug!("Logging initialised at {level}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Debug);
        init(LevelFilter::Warn);
        log::warn!("still logging after a second init");
    }
}
