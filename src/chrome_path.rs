//! Chrome/Chromium executable discovery.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Well-known Chrome/Chromium executable paths per platform.
#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(all(unix, not(target_os = "macos")))]
const KNOWN_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(not(unix))]
const KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

/// Command names looked up in `PATH`.
const KNOWN_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Picks the browser executable.
///
/// An explicit path wins; otherwise see [`detect_chrome`]. `None` leaves the
/// choice to chromiumoxide.
pub fn resolve_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => detect_chrome(),
    }
}

/// Looks for an installed browser: the `CHROME` variable, then `PATH`, then
/// the platform's usual install locations.
pub fn detect_chrome() -> Option<PathBuf> {
    detect_with(
        std::env::var_os("CHROME"),
        |cmd| which::which(cmd).ok(),
        Path::exists,
    )
}

fn detect_with<W, E>(env: Option<OsString>, which: W, exists: E) -> Option<PathBuf>
where
    W: Fn(&str) -> Option<PathBuf>,
    E: Fn(&Path) -> bool,
{
    if let Some(path) = env.map(PathBuf::from).filter(|p| exists(p)) {
        debug!("Chrome found via CHROME: {}", path.display());
        return Some(path);
    }

    if let Some(path) = KNOWN_COMMANDS.iter().find_map(|cmd| which(cmd)) {
        debug!("Chrome found in PATH: {}", path.display());
        return Some(path);
    }

    let path = KNOWN_PATHS
        .iter()
        .map(Path::new)
        .find(|p| exists(p))
        .map(Path::to_path_buf)?;
    debug!("Chrome found at {}", path.display());
    Some(path)
}
