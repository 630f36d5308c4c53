use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use caller_core::config::JobCacheConfig;
use caller_core::traits::JobCache;
use caller_core::{CallerResult, JobId, JobResult};
use chrono::{DateTime, Duration, Utc};
use tokio::fs;
use tracing::{debug, info, warn};

const RETURN_FILE: &str = "return.json";

/// How long cached jobs are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    pub max_count: Option<usize>,
}

impl From<&JobCacheConfig> for RetentionPolicy {
    fn from(config: &JobCacheConfig) -> Self {
        Self {
            max_age: config.keep_jobs_hours.and_then(|hours| {
                let age = i64::try_from(hours).ok().and_then(Duration::try_hours);
                if age.is_none() {
                    warn!(hours, "keep_jobs_hours is out of range, age retention disabled");
                }
                age
            }),
            max_count: config.max_jobs,
        }
    }
}

/// Local job cache: `<jobs_dir>/<jid>/return.json`.
///
/// Every successful write is followed by a retention pass, so the cache
/// stays bounded without a background sweeper.
pub struct FileJobCache {
    jobs_dir: PathBuf,
    retention: RetentionPolicy,
}

impl FileJobCache {
    pub fn new(jobs_dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            retention,
        }
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    async fn write(&self, jid: &JobId, result: &JobResult) -> CallerResult<()> {
        let job_dir = self.jobs_dir.join(jid.as_str());
        fs::create_dir_all(&job_dir).await?;

        let tmp_path = job_dir.join(format!(".{RETURN_FILE}.tmp"));
        fs::write(&tmp_path, serde_json::to_vec_pretty(result)?).await?;
        fs::rename(&tmp_path, job_dir.join(RETURN_FILE)).await?;
        Ok(())
    }

    /// Apply the retention policy as of `now`; returns the number of jobs removed.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> CallerResult<usize> {
        let mut jids = self.list().await?;
        let mut expired = Vec::new();

        if let Some(max_age) = self.retention.max_age {
            match now.checked_sub_signed(max_age) {
                Some(cutoff) => jids.retain(|jid| match jid.timestamp() {
                    Some(ts) if ts < cutoff => {
                        expired.push(jid.clone());
                        false
                    }
                    _ => true,
                }),
                None => warn!("Job cache max age reaches past the calendar, skipping age pruning"),
            }
        }

        if let Some(max_count) = self.retention.max_count {
            if jids.len() > max_count {
                let excess = jids.len() - max_count;
                expired.extend(jids.drain(..excess));
            }
        }

        let mut removed = 0;
        for jid in &expired {
            match fs::remove_dir_all(self.jobs_dir.join(jid.as_str())).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => warn!(jid = %jid, "Failed to remove cached job: {}", e),
            }
        }

        if removed > 0 {
            info!("Pruned {} cached job(s) from {}", removed, self.jobs_dir.display());
        }
        Ok(removed)
    }

    pub async fn prune(&self) -> CallerResult<usize> {
        self.prune_at(Utc::now()).await
    }
}

#[async_trait]
impl JobCache for FileJobCache {
    async fn cache(&self, jid: &JobId, result: &JobResult) -> bool {
        if let Err(e) = self.write(jid, result).await {
            warn!(jid = %jid, "Failed to cache job locally: {}", e);
            return false;
        }
        debug!(jid = %jid, "Cached job result");

        if let Err(e) = self.prune().await {
            warn!("Job cache retention pass failed: {}", e);
        }
        true
    }

    async fn load(&self, jid: &JobId) -> CallerResult<Option<JobResult>> {
        let path = self.jobs_dir.join(jid.as_str()).join(RETURN_FILE);
        match fs::read(&path).await {
            Ok(buf) => Ok(Some(serde_json::from_slice(&buf)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> CallerResult<Vec<JobId>> {
        let mut entries = match fs::read_dir(&self.jobs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match fs::metadata(entry.path().join(RETURN_FILE)).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }
            jids.push(JobId::new(entry.file_name().to_string_lossy().to_string()));
        }
        jids.sort();
        Ok(jids)
    }
}
