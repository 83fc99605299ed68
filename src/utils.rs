use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable that relocates every gurney directory.
pub const HOME_ENV: &str = "GURNEY_HOME";

/// Directories gurney reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardPaths {
    pub base_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

impl StandardPaths {
    pub fn under(base_dir: PathBuf) -> Self {
        Self {
            scratch_dir: base_dir.join("scratch"),
            exports_dir: base_dir.join("exports"),
            logs_dir: base_dir.join("logs"),
            database_path: base_dir.join("gurney.db"),
            base_dir,
        }
    }
}

/// Resolves the platform data directory (`GURNEY_HOME` wins when set).
///
/// - Linux: `~/.local/share/gurney`
/// - macOS: `~/Library/Application Support/gurney`
/// - Windows: `%APPDATA%/gurney`
pub fn standard_paths() -> StandardPaths {
    let base = std::env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|d| d.join("gurney")))
        .unwrap_or_else(|| PathBuf::from(".gurney"));
    StandardPaths::under(base)
}

/// Cooperative cancellation signal shared between a run and whoever may stop it.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Formats an optional f64 to 2 decimal places, or returns "-" if None or non-finite.
pub fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.2}"),
        _ => "-".to_owned(),
    }
}

/// Human readable byte size used in listings.
pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let suffix = UNITS.get(unit).copied().unwrap_or("B");
    if unit == 0 {
        format!("{bytes} {suffix}")
    } else {
        format!("{value:.1} {suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_paths_layout() {
        let paths = StandardPaths::under(PathBuf::from("/tmp/g"));
        assert_eq!(paths.database_path, PathBuf::from("/tmp/g/gurney.db"));
        assert_eq!(paths.logs_dir, PathBuf::from("/tmp/g/logs"));
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_set());
        handle.trigger();
        assert!(flag.is_set());
        flag.reset();
        assert!(!handle.is_set());
    }

    #[test]
    fn test_fmt_helpers() {
        assert_eq!(fmt_opt(Some(1.234)), "1.23");
        assert_eq!(fmt_opt(Some(f64::NAN)), "-");
        assert_eq!(fmt_opt(None), "-");
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
    }
}
