//! Chromium binary detection and install guidance.

use std::path::PathBuf;

/// Chromium-based executables that speak CDP, searched in PATH order.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const MACOS_APP_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

/// Result of browser detection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub found: bool,
    pub path: Option<PathBuf>,
    /// Platform-specific install instructions when nothing was found.
    pub install_hint: String,
}

/// Detect a usable Chromium-based browser.
///
/// Checks (in order): the configured path, the `CHROME` environment
/// variable, platform app-bundle paths, then known executable names in PATH.
pub fn detect_browser(custom_path: Option<&str>) -> DetectionResult {
    if let Some(path) = custom_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return found(p);
        }
    }

    if let Ok(env_path) = std::env::var("CHROME") {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return found(p);
        }
    }

    #[cfg(target_os = "macos")]
    for path in MACOS_APP_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return found(p);
        }
    }

    for name in CHROMIUM_EXECUTABLES {
        if let Ok(p) = which::which(name) {
            return found(p);
        }
    }

    DetectionResult {
        found: false,
        path: None,
        install_hint: install_instructions().to_string(),
    }
}

/// Platform-specific install guidance, included in launch failure messages.
pub fn install_instructions() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "Install Chrome from https://www.google.com/chrome/ or run: brew install --cask chromium"
    }
    #[cfg(target_os = "linux")]
    {
        "Install with your package manager, e.g.: apt install chromium-browser"
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        "Install Chrome from https://www.google.com/chrome/"
    }
}

fn found(path: PathBuf) -> DetectionResult {
    DetectionResult {
        found: true,
        path: Some(path),
        install_hint: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_path_must_exist_to_win() {
        let result = detect_browser(Some("/definitely/not/a/browser"));
        // Falls through to the other strategies; whatever the host has, the
        // bogus path itself must not be reported back.
        if let Some(path) = result.path {
            assert_ne!(path, PathBuf::from("/definitely/not/a/browser"));
        }
    }

    #[test]
    fn missing_browser_carries_a_hint() {
        let result = DetectionResult {
            found: false,
            path: None,
            install_hint: install_instructions().to_string(),
        };
        assert!(!result.install_hint.is_empty());
    }
}
