//! Opening the preview URL

use crate::model::session::TargetMode;
use std::io;

/// Shows a preview URL to the user
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str, mode: TargetMode) -> io::Result<()>;
}

/// Opens browser-mode previews in the system browser. In-app targets are
/// handed to the embedding webview, which only needs the URL logged here.
#[cfg(feature = "runtime")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowserLauncher;

#[cfg(feature = "runtime")]
impl BrowserLauncher for SystemBrowserLauncher {
    fn launch(&self, url: &str, mode: TargetMode) -> io::Result<()> {
        if mode.is_in_app() {
            tracing::info!("In-app preview ready at {}", url);
            return Ok(());
        }
        tracing::info!("Opening {} in the system browser", url);
        open::that(url)
    }
}

/// Launcher that does nothing (headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLauncher;

impl BrowserLauncher for NoopLauncher {
    fn launch(&self, url: &str, _mode: TargetMode) -> io::Result<()> {
        tracing::debug!("Preview available at {}", url);
        Ok(())
    }
}
