use anyhow::{Context, Result};
use tokio::fs;

const NODE_ID_FILE: &str = "node_id.txt";
const TRUSTED_KEY_FILE: &str = "trusted_key.txt";

/// Loads the persisted node UUID, or creates and persists a fresh one on first run.
pub async fn load_or_create_node_id() -> Result<String> {
    if let Some(id) = load_node_id().await {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    save_node_id(&id).await?;
    Ok(id)
}

async fn load_node_id() -> Option<String> {
    let contents = fs::read_to_string(NODE_ID_FILE).await.ok()?;
    let id = contents.lines().next()?.trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

async fn save_node_id(id: &str) -> Result<()> {
    fs::write(NODE_ID_FILE, id)
        .await
        .context("failed to save node ID to file")
}

/// Returns the pinned scheduler public key (hex-PEM), or empty if no pin exists yet.
pub async fn load_trusted_key() -> String {
    match fs::read_to_string(TRUSTED_KEY_FILE).await {
        Ok(contents) => contents.lines().next().unwrap_or("").trim().to_string(),
        Err(_) => String::new(),
    }
}

/// Persists a new pinned public key, overwriting any existing pin. Only called
/// from an authenticated handshake.
pub async fn save_trusted_key(public_key_hex: &str) -> Result<()> {
    fs::write(TRUSTED_KEY_FILE, public_key_hex)
        .await
        .context("failed to save trusted key to file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_node_id_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = Cwd::enter(tmp.path());
        let id = load_or_create_node_id().await.unwrap();
        assert!(!id.is_empty());
        let reloaded = load_or_create_node_id().await.unwrap();
        assert_eq!(id, reloaded);
        drop(guard);
    }

    #[tokio::test]
    async fn trusted_key_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = Cwd::enter(tmp.path());
        assert_eq!(load_trusted_key().await, "");
        save_trusted_key("deadbeef").await.unwrap();
        assert_eq!(load_trusted_key().await, "deadbeef");
        drop(guard);
    }

    /// Serializes tests that chdir, since the working directory is process-global.
    struct Cwd {
        _lock: std::sync::MutexGuard<'static, ()>,
        previous: std::path::PathBuf,
    }

    impl Cwd {
        fn enter(dir: &std::path::Path) -> Self {
            static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
            let lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let previous = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            Cwd {
                _lock: lock,
                previous,
            }
        }
    }

    impl Drop for Cwd {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.previous);
        }
    }
}
