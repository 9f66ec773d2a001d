use parlor_core::GameConfig;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "config.json";

pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parlor")
    })
}

/// Settings from `--config`, else `config.json` in the data directory, else
/// the built-in defaults.
pub async fn load_game_config(
    explicit: Option<&Path>,
    data_dir: &Path,
) -> parlor_core::Result<GameConfig> {
    if let Some(path) = explicit {
        return GameConfig::load(path).await;
    }

    let fallback = data_dir.join(SETTINGS_FILE);
    if tokio::fs::try_exists(&fallback).await? {
        tracing::debug!("Loading settings from {}", fallback.display());
        return GameConfig::load(&fallback).await;
    }
    Ok(GameConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_defaults_without_settings_file() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path();

        let config = load_game_config(None, dir).await.unwrap();
        assert_eq!(config.economy.registration_grant, 100_000);

        tokio::fs::write(dir.join(SETTINGS_FILE), r#"{"economy": {"registration_grant": 5}}"#)
            .await
            .unwrap();
        let config = load_game_config(None, dir).await.unwrap();
        assert_eq!(config.economy.registration_grant, 5);
    }
}
