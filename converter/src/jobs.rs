//! Background conversion jobs and their queryable status.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use spatial_core::ConversionType;

use crate::{ConversionRequest, ConversionResult, Converter, Progress};

/// Progress recorded when a worker picks a job up.
const STARTED_PROGRESS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Converting,
    Ready,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Converting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStatus {
    pub job_id: String,
    pub file_id: String,
    pub conversion_type: ConversionType,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionStatus {
    fn pending(job_id: String, file_id: &str, conversion_type: ConversionType) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            file_id: file_id.to_string(),
            conversion_type,
            status: JobState::Pending,
            progress: 0,
            output_path: None,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

type Entry = Arc<RwLock<ConversionStatus>>;

/// What `submit` did: either started a worker or found the job already
/// running.
#[derive(Debug)]
pub struct Submission {
    pub status: ConversionStatus,
    /// `None` when an active job with the same id already existed.
    pub worker: Option<JoinHandle<()>>,
}

/// Jobs keyed by `conv_{file_id}_{conversion_type}`. Each job's status has its
/// own lock, so updating one job never blocks reads of the table or of
/// other jobs.
pub struct JobRegistry {
    converter: Arc<Converter>,
    jobs: RwLock<HashMap<String, Entry>>,
}

impl JobRegistry {
    pub fn new(converter: Arc<Converter>) -> Self {
        Self {
            converter,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn job_id(file_id: &str, conversion_type: ConversionType) -> String {
        format!("conv_{file_id}_{conversion_type}")
    }

    /// Starts `request` on a worker thread unless the same job is still
    /// pending or converting, in which case its current status is returned.
    pub fn submit(&self, file_id: &str, request: ConversionRequest) -> Submission {
        let job_id = Self::job_id(file_id, request.conversion_type);
        let entry = {
            let mut jobs = self.jobs.write();
            if let Some(existing) = jobs.get(&job_id) {
                let status = existing.read().clone();
                if status.status.is_active() {
                    log::info!("job {job_id} already {:?}", status.status);
                    return Submission { status, worker: None };
                }
            }
            let entry = Arc::new(RwLock::new(ConversionStatus::pending(
                job_id.clone(),
                file_id,
                request.conversion_type,
            )));
            jobs.insert(job_id.clone(), Arc::clone(&entry));
            entry
        };
        log::info!("job {job_id} pending: source={:?}", request.source);

        let status = entry.read().clone();
        let converter = Arc::clone(&self.converter);
        let worker_entry = Arc::clone(&entry);
        let spawned = thread::Builder::new()
            .name(job_id.clone())
            .spawn(move || run_job(&converter, &worker_entry, &request));
        match spawned {
            Ok(handle) => Submission {
                status,
                worker: Some(handle),
            },
            Err(e) => {
                log::error!("job {job_id} could not start: {e}");
                let mut failed = entry.write();
                failed.status = JobState::Failed;
                failed.error = Some(format!("worker could not start: {e}"));
                failed.touch();
                Submission {
                    status: failed.clone(),
                    worker: None,
                }
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<ConversionStatus> {
        let entry = self.jobs.read().get(job_id).cloned()?;
        let status = entry.read().clone();
        Some(status)
    }

    pub fn list(&self) -> Vec<ConversionStatus> {
        let entries: Vec<Entry> = self.jobs.read().values().cloned().collect();
        let mut statuses: Vec<ConversionStatus> = entries.iter().map(|e| e.read().clone()).collect();
        statuses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        statuses
    }
}

fn run_job(converter: &Converter, entry: &Entry, request: &ConversionRequest) {
    let job_id = {
        let mut status = entry.write();
        status.status = JobState::Converting;
        status.progress = STARTED_PROGRESS;
        status.touch();
        status.job_id.clone()
    };
    log::info!("job {job_id} converting");

    let sink = Arc::clone(entry);
    let progress = Progress::new(move |percent| {
        let mut status = sink.write();
        if status.status == JobState::Converting && percent > status.progress {
            status.progress = percent;
            status.touch();
        }
    });
    let result = converter.convert(request, &progress);

    let mut status = entry.write();
    if result.success {
        status.status = JobState::Ready;
        status.progress = 100;
        status.output_path = result.output_path.clone();
        log::info!("job {job_id} ready: {:?}", status.output_path);
    } else {
        status.status = JobState::Failed;
        status.error = result.error.clone();
        log::warn!("job {job_id} failed: {:?}", status.error);
    }
    status.result = Some(result);
    status.touch();
}
