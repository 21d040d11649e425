use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::traits::HistoryStore;
use crate::error::Result;
use crate::types::{ConflictHistoryEntry, HistoryFilter};

/// History kept as one JSON document per line. Entries written by earlier
/// processes are visible to later ones.
pub struct JsonlHistoryStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonlHistoryStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            write_guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, entry: &ConflictHistoryEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_guard.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // a torn final line from an interrupted write must not swallow this entry
        if ends_mid_line(&mut file).await? {
            log::warn!("Terminating partial last line in {}", self.path.display());
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConflictHistoryEntry>(line) {
                Ok(entry) if filter.matches(&entry) => entries.push(entry),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "Skipping corrupt history line {} in {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}

async fn ends_mid_line(file: &mut fs::File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(std::io::SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}
