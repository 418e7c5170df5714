//! Data directory and database location resolution.

use std::path::{Path, PathBuf};

/// Resolve the data directory: `FLOWLINE_DATA_DIR` if set, otherwise
/// `~/.flowline`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLOWLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".flowline")
}

/// Database URL for the engine store at `{data_dir}/flowline.db`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("flowline.db").display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_shape() {
        let url = database_url(Path::new("/tmp/flowline-test"));
        assert!(url.starts_with("sqlite:///tmp/flowline-test"));
        assert!(url.contains("flowline.db"));
        assert!(url.ends_with("?mode=rwc"));
    }
}
