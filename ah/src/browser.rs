//! Open the shared UI in the user's browser, once per process

use std::io;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

/// Function that opens a URL
pub type Opener = Box<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

pub struct BrowserLauncher {
    enabled: bool,
    opened: AtomicBool,
    opener: Opener,
}

impl BrowserLauncher {
    pub fn new(enabled: bool) -> Self {
        Self::with_opener(enabled, Box::new(open_in_browser))
    }

    pub fn with_opener(enabled: bool, opener: Opener) -> Self {
        Self {
            enabled,
            opened: AtomicBool::new(false),
            opener,
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self::new(config.open_on_first_ask)
    }

    /// Open `url` if enabled and not yet opened; returns whether an attempt was made
    ///
    /// Failures are logged and otherwise ignored.
    pub fn open_once(&self, url: &str) -> bool {
        if !self.enabled || self.opened.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!(%url, "BrowserLauncher::open_once: opening");
        match (self.opener)(url) {
            Ok(()) => info!(%url, "Opened browser"),
            Err(e) => warn!(%url, error = %e, "Failed to open browser"),
        }
        true
    }
}

/// Launch the platform URL opener without waiting for it
pub fn open_in_browser(url: &str) -> io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    // Reap the opener in the background so it does not linger as a zombie
    std::thread::spawn(move || child.wait());
    Ok(())
}
