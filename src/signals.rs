//! Signal handling for graceful shutdown
//!
//! The handler thread only raises a flag. The TUI loop checks it between
//! frames and runs the normal shutdown path (final save and backup), so no
//! storage work ever happens inside signal context.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared shutdown flag, set from SIGINT/SIGTERM or programmatically
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install SIGINT/SIGTERM handlers on a background thread
    pub fn setup_signal_handlers(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
            use std::thread;

            let mut signals = Signals::new([SIGINT, SIGTERM])?;
            let flag = Arc::clone(&self.shutdown_flag);

            thread::spawn(move || {
                for sig in signals.forever() {
                    match sig {
                        SIGINT => {
                            info!("Received SIGINT, shutting down");
                            flag.store(true, Ordering::SeqCst);
                            break;
                        }
                        SIGTERM => {
                            info!("Received SIGTERM, shutting down");
                            flag.store(true, Ordering::SeqCst);
                            break;
                        }
                        _ => warn!("Received unexpected signal: {}", sig),
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.shutdown_flag))?;
        }

        info!("Signal handlers installed");
        Ok(())
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        info!("Shutdown requested programmatically");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_handler_creation() {
        let handler = ShutdownHandler::new();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_request_is_shared_between_clones() {
        let handler = ShutdownHandler::new();
        let observer = handler.clone();

        handler.request_shutdown();
        assert!(observer.is_shutdown_requested());
    }
}
