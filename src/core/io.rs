use anyhow::Result;
use async_trait::async_trait;

/// Key → blob store backing the durable speech cache.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        // Write-then-rename so a crash never leaves a torn clip behind.
        let staging = format!("{}.part", path);
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_storage_roundtrip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("nested/dir/blob.bin");
        let path_str = path.to_str().unwrap();
        let storage = NativeStorage::new();

        assert!(!storage.exists(path_str).await?);
        storage.write(path_str, b"hello").await?;
        assert!(storage.exists(path_str).await?);
        assert_eq!(storage.read(path_str).await?, b"hello");
        assert!(!temp_dir.path().join("nested/dir/blob.bin.part").exists());

        storage.delete(path_str).await?;
        assert!(!storage.exists(path_str).await?);
        // Deleting a missing key is fine.
        storage.delete(path_str).await?;
        Ok(())
    }
}
