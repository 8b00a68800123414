use crate::error::{KeeperError, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "keeper";
pub const APP_NAME: &str = "keeper";

pub const DATA_DIR_ENV: &str = "KEEPER_DATA_DIR";
pub const DATABASE_FILE: &str = "data.db";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| KeeperError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}
