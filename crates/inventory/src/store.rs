//! 库存文档存储
//!
//! 整个实验室库存是一份 [`Lab`] 文档，读写都以整份文档为单位，
//! 修订号为文档 JSON 的 sha256。提交时携带读取时的修订号，不一致说明
//! 期间有其他写入，返回 [`InventoryError::Conflict`]。
//! - `MemoryStore` - 测试用，文档保存在内存中
//! - `FileStore` - 单个 JSON 文件

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_common::config::{InventoryConfig, InventoryStoreKind};
use fleet_proto::inventory::Lab;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{InventoryError, InventoryResult};

/// 读取到的库存及其修订号
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub lab: Lab,
    /// 空字符串表示库存尚不存在
    pub revision: String,
}

pub fn revision_of(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

fn encode(lab: &Lab) -> InventoryResult<Vec<u8>> {
    let mut contents = serde_json::to_vec_pretty(lab)?;
    contents.push(b'\n');
    Ok(contents)
}

fn check_revision(expected: &str, actual: &str) -> InventoryResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(InventoryError::Conflict {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[async_trait]
pub trait InventoryStore: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> InventoryResult<Snapshot>;

    /// 以 `base_revision` 为基础提交新文档，返回新的修订号
    async fn commit(&self, lab: &Lab, base_revision: &str, message: &str) -> InventoryResult<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<(Lab, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lab(lab: Lab) -> InventoryResult<Self> {
        let revision = revision_of(&encode(&lab)?);
        Ok(Self {
            state: Mutex::new(Some((lab, revision))),
        })
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn load(&self) -> InventoryResult<Snapshot> {
        Ok(match self.state.lock().await.as_ref() {
            Some((lab, revision)) => Snapshot {
                lab: lab.clone(),
                revision: revision.clone(),
            },
            None => Snapshot {
                lab: Lab::default(),
                revision: String::new(),
            },
        })
    }

    async fn commit(&self, lab: &Lab, base_revision: &str, message: &str) -> InventoryResult<String> {
        let mut state = self.state.lock().await;
        let current = state.as_ref().map(|(_, r)| r.as_str()).unwrap_or_default();
        check_revision(base_revision, current)?;
        let revision = revision_of(&encode(lab)?);
        *state = Some((lab.clone(), revision.clone()));
        debug!(%revision, message, "inventory committed");
        Ok(revision)
    }
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // 串行化同一进程内的提交
    commit_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> InventoryResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl InventoryStore for FileStore {
    async fn load(&self) -> InventoryResult<Snapshot> {
        match self.read().await? {
            Some(contents) => Ok(Snapshot {
                lab: serde_json::from_slice(&contents)?,
                revision: revision_of(&contents),
            }),
            None => Ok(Snapshot {
                lab: Lab::default(),
                revision: String::new(),
            }),
        }
    }

    async fn commit(&self, lab: &Lab, base_revision: &str, message: &str) -> InventoryResult<String> {
        let _guard = self.commit_lock.lock().await;
        let current = self
            .read()
            .await?
            .map(|c| revision_of(&c))
            .unwrap_or_default();
        check_revision(base_revision, &current)?;

        let contents = encode(lab)?;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        // 先写临时文件再改名，读取方不会看到写了一半的文档
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        let revision = revision_of(&contents);
        info!(path = %self.path.display(), %revision, message, "inventory committed");
        Ok(revision)
    }
}

/// 按配置打开库存存储
pub fn open_store(config: &InventoryConfig) -> Arc<dyn InventoryStore> {
    match config.store {
        InventoryStoreKind::Memory => Arc::new(MemoryStore::new()),
        InventoryStoreKind::File => Arc::new(FileStore::new(&config.path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_proto::inventory::DeviceUnderTest;

    fn lab(hostname: &str) -> Lab {
        Lab {
            duts: vec![DeviceUnderTest {
                id: format!("id-{hostname}"),
                hostname: hostname.to_string(),
                ..Default::default()
            }],
            servers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_optimistic_commit() {
        let store = MemoryStore::new();
        let empty = store.load().await.unwrap();
        assert_eq!(empty.revision, "");

        let r1 = store.commit(&lab("h1"), "", "init").await.unwrap();
        assert_eq!(store.load().await.unwrap().revision, r1);

        let err = store.commit(&lab("h2"), "", "stale").await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict { .. }));

        let r2 = store.commit(&lab("h2"), &r1, "update").await.unwrap();
        assert_ne!(r1, r2);
        assert_eq!(store.load().await.unwrap().lab.duts[0].hostname, "h2");
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory").join("lab.json");
        let store = FileStore::new(&path);
        assert_eq!(store.load().await.unwrap().lab, Lab::default());

        let revision = store.commit(&lab("h1"), "", "init").await.unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(revision, revision_of(&contents));

        // 另一个实例看到同一份文档
        let other = FileStore::new(&path);
        let snapshot = other.load().await.unwrap();
        assert_eq!(snapshot.revision, revision);
        assert_eq!(snapshot.lab.duts[0].id, "id-h1");

        std::fs::write(&path, b"{\"duts\": []}").unwrap();
        let err = store.commit(&lab("h3"), &revision, "stale").await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict { .. }));
    }
}
