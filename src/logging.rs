//! Logging setup for the daemon

use crate::config::LoggingConfig;

use std::panic::{self, PanicInfo};
use tracing::error;

/// Install the global tracing subscriber
pub fn init(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,utxo_locker=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Report panics through tracing instead of the default stderr hook
///
/// Faulting unlock conditions are caught by the sweep, so without this every
/// pass would also print the panic (and a backtrace) to stderr.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(log_panic));
}

fn log_panic(info: &PanicInfo<'_>) {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");

    match info.location() {
        Some(location) => error!(
            target: "panic",
            "Panicked at {}:{}: {}",
            location.file(),
            location.line(),
            message
        ),
        None => error!(target: "panic", "Panicked: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::UnlockCondition;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_caught_condition_panic_is_logged_through_tracing() {
        let buffer = SharedBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let buffer = buffer.clone();
                move || buffer.clone()
            })
            .with_ansi(false)
            .finish();

        let previous = panic::take_hook();
        install_panic_hook();
        let fault = tracing::subscriber::with_default(subscriber, || {
            UnlockCondition::custom(|| panic!("utxo index unavailable")).evaluate()
        });
        panic::set_hook(previous);

        assert!(fault.is_err());
        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("utxo index unavailable"));
        assert!(logged.contains("logging.rs"));
    }
}
