pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::Settings;

/// Load environment variables from .env files.
/// First loads from ~/.env (home directory), then from ./.env (project directory).
/// Project directory values take precedence over home directory values.
/// Call this before parsing CLI args to ensure env vars are available.
pub fn load_env_file() {
    // Load from home directory first (lower precedence)
    if let Some(dirs) = directories::BaseDirs::new() {
        dotenv::from_path(dirs.home_dir().join(".env")).ok();
    }

    // dotenv::dotenv() does not overwrite variables that are already set
    dotenv::dotenv().ok();
}
