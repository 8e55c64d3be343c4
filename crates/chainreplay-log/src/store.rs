//! Append-only per-reducer log files and their checkpoint files.
//!
//! Layout under the base directory:
//!
//! ```text
//! logs/<reducer>.json         one JSON LogRecord per line, in position order
//! logs/<reducer>.index.json   BlockIdentifier up to which the log is complete
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use tokio::sync::Mutex;

use chainreplay_core::{BlockIdentifier, IndexerError, LogPosition, LogRecord};

use crate::stream_utils::{batch, take_last};

fn io_error(path: &Path, e: std::io::Error) -> IndexerError {
    IndexerError::Storage(format!("{}: {e}", path.display()))
}

/// Handle to a directory of reducer logs.
pub struct LogStore {
    base: PathBuf,
    /// Last appended position per reducer, loaded on first append.
    tails: Mutex<HashMap<String, Option<LogPosition>>>,
}

impl LogStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            tails: Mutex::new(HashMap::new()),
        }
    }

    pub fn logs_directory(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn path_for_logs(&self, reducer: &str) -> PathBuf {
        self.logs_directory().join(format!("{reducer}.json"))
    }

    pub fn path_for_logs_index(&self, reducer: &str) -> PathBuf {
        self.logs_directory().join(format!("{reducer}.index.json"))
    }

    // ─── Writing ─────────────────────────────────────────────────────────────

    /// Append `records` to the end of the reducer's log.
    ///
    /// Each record must sort strictly after the previous one (and after the
    /// last record already in the file); otherwise nothing is written.
    pub async fn append(&self, reducer: &str, records: &[LogRecord]) -> Result<(), IndexerError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tails = self.tails.lock().await;
        let mut last = match tails.get(reducer) {
            Some(tail) => *tail,
            None => {
                truncate_torn_tail(&self.path_for_logs(reducer)).await?;
                self.load_last_log(reducer).await?.map(|r| r.position())
            }
        };

        let mut buf = String::new();
        for record in records {
            let position = record.position();
            if let Some(prev) = last {
                if position <= prev {
                    return Err(IndexerError::ChainInconsistency {
                        block_number: record.block_number,
                        expected: format!("position after {prev}"),
                        actual: position.to_string(),
                    });
                }
            }
            let line = serde_json::to_string(record)
                .map_err(|e| IndexerError::Storage(format!("serializing log: {e}")))?;
            buf.push_str(&line);
            buf.push('\n');
            last = Some(position);
        }

        let dir = self.logs_directory();
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;
        let path = self.path_for_logs(reducer);
        let written = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(buf.as_bytes()).await?;
            file.sync_data().await
        }
        .await;
        if let Err(e) = written {
            // The file may now end in a partial line; repair it on the next append.
            tails.remove(reducer);
            return Err(io_error(&path, e));
        }

        tails.insert(reducer.to_string(), last);
        tracing::debug!(reducer, appended = records.len(), tail = ?last, "appended logs");
        Ok(())
    }

    /// Drain `records` into the reducer's log, `batch_size` records per append.
    ///
    /// Returns the number of records written. A failing batch stops the
    /// drain; earlier batches stay on disk.
    pub async fn append_stream(
        &self,
        reducer: &str,
        records: BoxStream<'_, Result<LogRecord, IndexerError>>,
        batch_size: usize,
    ) -> Result<u64, IndexerError> {
        let mut batches = batch(records, batch_size);
        let mut written = 0u64;
        while let Some(chunk) = batches.try_next().await? {
            self.append(reducer, &chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    /// Atomically replace the reducer's checkpoint file.
    pub async fn write_log_index(
        &self,
        reducer: &str,
        block: &BlockIdentifier,
    ) -> Result<(), IndexerError> {
        let dir = self.logs_directory();
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        let path = self.path_for_logs_index(reducer);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec(block)
            .map_err(|e| IndexerError::Storage(format!("serializing checkpoint: {e}")))?;
        fs::write(&tmp, contents).await.map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;

        tracing::debug!(reducer, block = %block, "wrote log checkpoint");
        Ok(())
    }

    // ─── Reading ─────────────────────────────────────────────────────────────

    /// Stream the reducer's log from the start.
    ///
    /// A missing file is an empty log. Calling again restarts from the top.
    pub fn read_forward(&self, reducer: &str) -> BoxStream<'static, Result<LogRecord, IndexerError>> {
        read_log_file(self.path_for_logs(reducer))
    }

    pub async fn load_last_log(&self, reducer: &str) -> Result<Option<LogRecord>, IndexerError> {
        take_last(self.read_forward(reducer)).await
    }

    pub async fn load_last_log_index(
        &self,
        reducer: &str,
    ) -> Result<Option<BlockIdentifier>, IndexerError> {
        let path = self.path_for_logs_index(reducer);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| IndexerError::Storage(format!("{}: {e}", path.display())))
    }
}

/// Cut an unterminated final line left by an interrupted append.
async fn truncate_torn_tail(path: &Path) -> Result<(), IndexerError> {
    const CHUNK: u64 = 4096;

    let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(path, e)),
    };
    let len = file.metadata().await.map_err(|e| io_error(path, e))?.len();

    let mut end = len;
    let mut keep = 0;
    let mut chunk = Vec::new();
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        chunk.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| io_error(path, e))?;
        file.read_exact(&mut chunk)
            .await
            .map_err(|e| io_error(path, e))?;
        if let Some(i) = chunk.iter().rposition(|b| *b == b'\n') {
            keep = start + i as u64 + 1;
            break;
        }
        end = start;
    }

    if keep < len {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = len - keep,
            "truncating torn log tail"
        );
        file.set_len(keep).await.map_err(|e| io_error(path, e))?;
        file.sync_data().await.map_err(|e| io_error(path, e))?;
    }
    Ok(())
}

enum ReadState {
    Unopened(PathBuf),
    Reading {
        path: PathBuf,
        reader: BufReader<File>,
        line_no: usize,
    },
    Finished,
}

fn read_log_file(path: PathBuf) -> BoxStream<'static, Result<LogRecord, IndexerError>> {
    stream::unfold(ReadState::Unopened(path), |state| async move {
        let (path, mut reader, mut line_no) = match state {
            ReadState::Finished => return None,
            ReadState::Reading {
                path,
                reader,
                line_no,
            } => (path, reader, line_no),
            ReadState::Unopened(path) => match File::open(&path).await {
                Ok(file) => (path, BufReader::new(file), 0),
                Err(e) if e.kind() == ErrorKind::NotFound => return None,
                Err(e) => return Some((Err(io_error(&path, e)), ReadState::Finished)),
            },
        };

        let mut line = Vec::new();
        loop {
            line_no += 1;
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some((Err(io_error(&path, e)), ReadState::Finished)),
            }
            if line.last() != Some(&b'\n') {
                // Unterminated tail of an interrupted append; never acknowledged.
                tracing::warn!(path = %path.display(), line_no, "ignoring torn log tail");
                return None;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return match serde_json::from_slice::<LogRecord>(&line) {
                Ok(record) => Some((
                    Ok(record),
                    ReadState::Reading {
                        path,
                        reader,
                        line_no,
                    },
                )),
                Err(e) => Some((
                    Err(IndexerError::Storage(format!(
                        "{}:{line_no}: corrupt log line: {e}",
                        path.display()
                    ))),
                    ReadState::Finished,
                )),
            };
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    pub(crate) fn record(block: u64, tx: u32, log: u32) -> LogRecord {
        LogRecord {
            block_number: block,
            block_hash: format!("0x{block:064x}"),
            transaction_index: tx,
            transaction_hash: format!("0x{:064x}", block * 1000 + tx as u64),
            log_index: log,
            address: "0x00000000000000000000000000000000000000aa".into(),
            topics: vec!["0xddf252ad".into()],
            data: "0x".into(),
            removed: false,
        }
    }

    #[tokio::test]
    async fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        let records: Vec<_> = store.read_forward("governor").try_collect().await.unwrap();
        assert!(records.is_empty());
        assert!(store.load_last_log("governor").await.unwrap().is_none());
        assert!(store.load_last_log_index("governor").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_stream_writes_in_batches_until_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        let incoming = vec![
            Ok(record(1, 0, 0)),
            Ok(record(2, 0, 0)),
            Ok(record(3, 0, 0)),
            Ok(record(2, 0, 0)),
        ];
        let err = store
            .append_stream("token", stream::iter(incoming).boxed(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::ChainInconsistency { block_number: 2, .. }));

        let on_disk: Vec<_> = store.read_forward("token").try_collect().await.unwrap();
        assert_eq!(on_disk.len(), 2);

        let more = vec![Ok(record(4, 0, 0)), Ok(record(5, 0, 0))];
        let written = store
            .append_stream("token", stream::iter(more).boxed(), 10)
            .await
            .unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn torn_tail_is_ignored_then_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store
            .append("token", &[record(1, 0, 0), record(2, 0, 0)])
            .await
            .unwrap();

        let path = store.path_for_logs("token");
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(br#"{"blockNumber":3,"blockH"#).await.unwrap();
        drop(file);

        let last = store.load_last_log("token").await.unwrap().unwrap();
        assert_eq!(last.position(), record(2, 0, 0).position());

        let reopened = LogStore::new(dir.path());
        reopened.append("token", &[record(3, 0, 0)]).await.unwrap();
        let blocks: Vec<_> = reopened
            .read_forward("token")
            .map_ok(|r| r.block_number)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(blocks, vec![1, 2, 3]);
        assert!(fs::read(&path).await.unwrap().ends_with(b"\n"));
    }

    #[tokio::test]
    async fn append_then_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store
            .append("token", &[record(1, 0, 0), record(1, 0, 1)])
            .await
            .unwrap();
        store.append("token", &[record(2, 3, 0)]).await.unwrap();

        let positions: Vec<_> = store
            .read_forward("token")
            .map_ok(|r| r.position())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            positions,
            vec![
                LogPosition::new(1, 0, 0),
                LogPosition::new(1, 0, 1),
                LogPosition::new(2, 3, 0)
            ]
        );
        let last = store.load_last_log("token").await.unwrap().unwrap();
        assert_eq!(last.position(), LogPosition::new(2, 3, 0));
        assert!(dir.path().join("logs/token.json").exists());
    }

    #[tokio::test]
    async fn out_of_order_append_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store.append("token", &[record(5, 0, 0)]).await.unwrap();

        let err = store
            .append("token", &[record(6, 0, 0), record(5, 0, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::ChainInconsistency { block_number: 5, .. }));

        // A fresh handle must also see the file tail.
        let reopened = LogStore::new(dir.path());
        let err = reopened.append("token", &[record(5, 0, 0)]).await.unwrap_err();
        assert!(matches!(err, IndexerError::ChainInconsistency { .. }));

        let count = reopened.read_forward("token").try_collect::<Vec<_>>().await.unwrap().len();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        let block = BlockIdentifier::new("0xabc", 10);
        store.write_log_index("token", &block).await.unwrap();
        assert_eq!(store.load_last_log_index("token").await.unwrap(), Some(block));

        let raw = std::fs::read_to_string(dir.path().join("logs/token.index.json")).unwrap();
        assert_eq!(raw, r#"{"hash":"0xabc","blockNumber":10}"#);
        assert!(!dir.path().join("logs/token.index.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_line_surfaces_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store.append("token", &[record(1, 0, 0)]).await.unwrap();
        let path = store.path_for_logs("token");
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        let items: Vec<_> = store.read_forward("token").collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(IndexerError::Storage(ref m)) if m.contains(":2:")));
    }
}
