//! Scoped ownership of a session driver.

use tracing::{debug, warn};

use super::{SessionDriver, SessionError};

/// Owns a driver for the duration of one run.
///
/// Call [`SessionGuard::close`] on every normal exit path. If the guard is
/// dropped while still open (task cancelled or aborted), the close is spawned
/// on the current runtime so the remote session is still released.
pub struct SessionGuard {
    driver: Option<Box<dyn SessionDriver>>,
    opened: bool,
}

impl SessionGuard {
    pub fn new(driver: Box<dyn SessionDriver>) -> Self {
        Self {
            driver: Some(driver),
            opened: false,
        }
    }

    /// Open the underlying session.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        let driver = self.driver_mut()?;
        driver.open().await?;
        self.opened = true;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.opened && self.driver.is_some()
    }

    /// Access the driver while the guard is alive.
    pub fn driver_mut(&mut self) -> Result<&mut (dyn SessionDriver + 'static), SessionError> {
        self.driver
            .as_deref_mut()
            .ok_or_else(|| SessionError::Transport("session already closed".to_string()))
    }

    /// Close the session and consume the guard.
    pub async fn close(mut self) -> Result<(), SessionError> {
        match self.driver.take() {
            Some(mut driver) => {
                debug!(driver = driver.name(), "Closing session");
                driver.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    driver = driver.name(),
                    "Session dropped without close, closing in background"
                );
                handle.spawn(async move {
                    if let Err(e) = driver.close().await {
                        warn!("Background session close failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!(
                    driver = driver.name(),
                    "Session dropped outside a runtime, remote session may leak"
                );
            }
        }
    }
}
