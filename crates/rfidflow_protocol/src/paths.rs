use std::path::{Path, PathBuf};
use std::sync::Once;

static CREATE_DIR_WARNED: Once = Once::new();

/// Resolve the RFID Flow home directory.
///
/// Priority:
/// 1) RFIDFLOW_HOME
/// 2) HOME/USERPROFILE
/// 3) ./.rfidflow
pub fn rfidflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("RFIDFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".rfidflow");
    }
    PathBuf::from(".").join(".rfidflow")
}

fn ensure_home_dir(home: &Path) {
    if let Err(err) = std::fs::create_dir_all(home) {
        CREATE_DIR_WARNED.call_once(|| {
            eprintln!(
                "Warning: failed to create RFID Flow home directory {}: {}. Set RFIDFLOW_HOME or pass --database.",
                home.display(),
                err
            );
        });
    }
}

/// Default database path: ~/.rfidflow/rfidflow.sqlite3
pub fn default_db_path() -> PathBuf {
    let home = rfidflow_home();
    ensure_home_dir(&home);
    home.join(crate::defaults::DEFAULT_DB_FILE)
}

/// Default logs directory: ~/.rfidflow/logs
pub fn default_logs_dir() -> PathBuf {
    let home = rfidflow_home();
    ensure_home_dir(&home);
    home.join("logs")
}

/// Default config file: ~/.rfidflow/rfidflow.toml
pub fn default_config_path() -> PathBuf {
    rfidflow_home().join(crate::defaults::DEFAULT_CONFIG_FILE)
}
