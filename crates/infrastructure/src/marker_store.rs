use std::collections::HashSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caller_core::traits::{MarkerStore, ProcessProbe, ProcessStatus};
use caller_core::{CallerResult, JobId, ProcessMarker};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

/// Marker store backed by one JSON file per job under `<cachedir>/proc`.
///
/// Files are written to a dot-prefixed temp name and renamed into place, so
/// readers never see a partial marker under its final name. Listing prunes
/// every marker whose owner is gone, foreign, or (in single-process mode) not
/// this process.
pub struct FileMarkerStore {
    proc_dir: PathBuf,
    probe: Arc<dyn ProcessProbe>,
    multiprocessing: bool,
    current_pid: u32,
    active: Mutex<HashSet<JobId>>,
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Keep,
    Skip,
    Remove,
}

impl FileMarkerStore {
    pub fn new(proc_dir: impl Into<PathBuf>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            proc_dir: proc_dir.into(),
            probe,
            multiprocessing: true,
            current_pid: std::process::id(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_multiprocessing(mut self, multiprocessing: bool) -> Self {
        self.multiprocessing = multiprocessing;
        self
    }

    pub fn with_current_pid(mut self, pid: u32) -> Self {
        self.current_pid = pid;
        self
    }

    pub fn proc_dir(&self) -> &Path {
        &self.proc_dir
    }

    fn marker_path(&self, jid: &JobId) -> PathBuf {
        self.proc_dir.join(jid.as_str())
    }

    fn is_active(&self, jid: &JobId) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(jid))
            .unwrap_or(false)
    }

    fn set_active(&self, jid: &JobId, running: bool) {
        if let Ok(mut active) = self.active.lock() {
            if running {
                active.insert(jid.clone());
            } else {
                active.remove(jid);
            }
        }
    }

    fn judge(&self, marker: &ProcessMarker) -> Verdict {
        let status = self.probe.probe(marker.pid);
        if status == ProcessStatus::NotRunning {
            return Verdict::Remove;
        }

        if self.multiprocessing {
            if marker.pid == self.current_pid {
                return Verdict::Skip;
            }
        } else if marker.pid != self.current_pid || !self.is_active(&marker.jid) {
            return Verdict::Remove;
        }

        if status == ProcessStatus::Foreign {
            warn!(
                pid = marker.pid,
                jid = %marker.jid,
                "PID exists but does not appear to be a caller process"
            );
            return Verdict::Remove;
        }

        Verdict::Keep
    }

    async fn remove_path(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!("Removed stale marker {}", path.display()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => debug!("Unable to remove marker {}: {}", path.display(), e),
        }
    }

    async fn read_marker(path: &Path) -> Option<Result<ProcessMarker, ()>> {
        let buf = match fs::read(path).await {
            Ok(buf) => buf,
            // Markers disappear whenever their job finishes.
            Err(_) => return None,
        };
        if buf.is_empty() {
            return Some(Err(()));
        }
        Some(serde_json::from_slice::<ProcessMarker>(&buf).map_err(|_| ()))
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    async fn create(
        &self,
        jid: &JobId,
        pid: u32,
        fun: &str,
        tgt: &str,
        metadata: Option<&Value>,
    ) -> CallerResult<ProcessMarker> {
        let marker = ProcessMarker::new(jid.clone(), pid, fun, tgt).with_metadata(metadata.cloned());

        fs::create_dir_all(&self.proc_dir).await?;
        let tmp_path = self.proc_dir.join(format!(".{}.tmp", jid.as_str()));
        fs::write(&tmp_path, serde_json::to_vec(&marker)?).await?;
        if let Err(e) = fs::rename(&tmp_path, self.marker_path(jid)).await {
            Self::remove_path(&tmp_path).await;
            return Err(e.into());
        }

        self.set_active(jid, true);
        debug!(jid = %jid, pid, fun, "Created process marker");
        Ok(marker)
    }

    async fn delete(&self, jid: &JobId) -> CallerResult<()> {
        self.set_active(jid, false);
        match fs::remove_file(self.marker_path(jid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> CallerResult<Vec<ProcessMarker>> {
        let mut entries = match fs::read_dir(&self.proc_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut markers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();

            let marker = match Self::read_marker(&path).await {
                None => continue,
                Some(Ok(marker)) => marker,
                Some(Err(())) => {
                    debug!("Discarding unreadable marker {}", path.display());
                    Self::remove_path(&path).await;
                    continue;
                }
            };

            match self.judge(&marker) {
                Verdict::Keep => markers.push(marker),
                Verdict::Skip => {}
                Verdict::Remove => Self::remove_path(&path).await,
            }
        }

        markers.sort_by(|a, b| a.jid.cmp(&b.jid));
        Ok(markers)
    }
}
