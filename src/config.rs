use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Covigil";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "covigil=info".to_string()
}

/// Get the application data directory (~/Covigil/ on all platforms)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Covigil")
}

/// Default location of the case-workflow database
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("covigil.db")
}

/// Read an environment variable, stripping surrounding quotes and
/// whitespace. Returns None for unset or effectively-empty values.
pub fn env_var(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let mut value = value.trim();
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[0] == bytes[value.len() - 1] {
            value = &value[1..value.len() - 1];
        }
    }
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
