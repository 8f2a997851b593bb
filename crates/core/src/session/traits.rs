//! Session driver capability traits.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::{Action, Condition, Credentials, DownloadRequest, ElementRef, PageState, Selector, SessionError};

/// Capabilities of one interactive session with the remote portal.
///
/// A driver is owned by a single acquisition run and never shared, hence
/// `&mut self` throughout.
#[async_trait]
pub trait SessionDriver: Send {
    /// Driver name for logging/audit.
    fn name(&self) -> &str;

    /// Start the underlying session.
    async fn open(&mut self) -> Result<(), SessionError>;

    /// Log into the portal. Fails with `Rejected` when the portal refuses the
    /// credentials.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError>;

    /// Load a page.
    async fn navigate(&mut self, target: &str) -> Result<(), SessionError>;

    /// Wait until the condition holds, failing with `Timeout` after `timeout`.
    async fn wait_for(&mut self, condition: &Condition, timeout: Duration)
        -> Result<(), SessionError>;

    /// Find an element on the current page.
    async fn locate(&mut self, selector: &Selector) -> Result<ElementRef, SessionError>;

    /// Act on a located element.
    async fn interact(&mut self, element: &ElementRef, action: &Action)
        -> Result<(), SessionError>;

    /// Start the download and wait for the artifact to land at
    /// `request.destination`. Returns the path actually written.
    async fn trigger_download(&mut self, request: &DownloadRequest)
        -> Result<PathBuf, SessionError>;

    /// Snapshot the current page for later inspection.
    async fn capture_diagnostic(&mut self) -> Result<PageState, SessionError>;

    /// Tear the session down. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Creates a fresh driver for every acquisition run.
pub trait SessionFactory: Send + Sync {
    fn create(&self) -> Box<dyn SessionDriver>;
}
