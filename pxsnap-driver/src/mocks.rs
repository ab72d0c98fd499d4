// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Functional Source License, Version 1.1, Apache 2.0 Future License (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    See LICENSE file for details
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::future::pending;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use pxsnap_error::{Code, Error, make_err};
use tokio::sync::RwLock;

use crate::operations::VolumeDriver;
use crate::session::DriverConnector;
use crate::types::{
    CloudBackupCreateRequest, CloudBackupCreateResponse, CloudBackupDeleteRequest,
    CloudBackupEnumerateRequest, CloudBackupEnumerateResponse, CloudBackupInfo,
    CloudBackupRestoreRequest, CloudBackupRestoreResponse, CloudBackupStatus,
    CloudBackupStatusRequest, CloudBackupStatusResponse, CloudBackupStatusType, Volume,
    VolumeLocator,
};

/// A mock implementation of `VolumeDriver` for testing
#[derive(Debug)]
pub struct MockVolumeDriver {
    // Volumes and snapshots known to the mock, keyed by id
    volumes: RwLock<HashMap<String, Volume>>,
    // Backups returned by enumerate
    backups: RwLock<Vec<CloudBackupInfo>>,
    // Scripted answers to status queries, keyed by job handle
    status_scripts: RwLock<HashMap<String, VecDeque<StatusStep>>>,
    // Job handles handed out by backup create and restore, in order
    job_names: RwLock<VecDeque<String>>,
    // Flag to simulate failures
    should_fail: AtomicBool,
    // Flag to simulate specific failure modes
    failure_mode: RwLock<FailureMode>,
    id_counter: AtomicUsize,
    // Counter for operation calls
    call_counts: CallCounts,
    // For capturing requests to verify correct parameter passing
    requests: RwLock<Vec<MockRequest>>,
}

/// One scripted answer to a status query. The last step of a script repeats
/// forever.
#[derive(Debug, Clone)]
pub enum StatusStep {
    Status(CloudBackupStatus),
    /// The job is not in the status map yet.
    Missing,
    /// The query itself fails.
    Error(Error),
    /// The query never returns.
    Hang,
}

impl StatusStep {
    pub fn status(status: CloudBackupStatusType) -> Self {
        Self::Status(CloudBackupStatus {
            status,
            ..Default::default()
        })
    }

    /// Terminal success resolving to backup `id`.
    pub fn done(id: &str) -> Self {
        Self::Status(CloudBackupStatus {
            id: id.to_string(),
            status: CloudBackupStatusType::Done,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub inspect_calls: AtomicUsize,
    pub snapshot_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub backup_create_calls: AtomicUsize,
    pub backup_enumerate_calls: AtomicUsize,
    pub backup_restore_calls: AtomicUsize,
    pub backup_status_calls: AtomicUsize,
    pub backup_delete_calls: AtomicUsize,
}

impl Clone for CallCounts {
    fn clone(&self) -> Self {
        let copy = |counter: &AtomicUsize| AtomicUsize::new(counter.load(Ordering::Relaxed));
        Self {
            inspect_calls: copy(&self.inspect_calls),
            snapshot_calls: copy(&self.snapshot_calls),
            delete_calls: copy(&self.delete_calls),
            backup_create_calls: copy(&self.backup_create_calls),
            backup_enumerate_calls: copy(&self.backup_enumerate_calls),
            backup_restore_calls: copy(&self.backup_restore_calls),
            backup_status_calls: copy(&self.backup_status_calls),
            backup_delete_calls: copy(&self.backup_delete_calls),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Inspect {
        volume_id: String,
    },
    Snapshot {
        volume_id: String,
        readonly: bool,
        locator: VolumeLocator,
        no_retry: bool,
    },
    Delete {
        volume_id: String,
    },
    BackupCreate(CloudBackupCreateRequest),
    BackupEnumerate(CloudBackupEnumerateRequest),
    BackupRestore(CloudBackupRestoreRequest),
    BackupStatus(CloudBackupStatusRequest),
    BackupDelete(CloudBackupDeleteRequest),
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    #[default]
    None,
    NotFound,
    NetworkError,
    Unauthorized,
    ServerError,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MockVolumeDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
            backups: RwLock::new(Vec::new()),
            status_scripts: RwLock::new(HashMap::new()),
            job_names: RwLock::new(VecDeque::new()),
            should_fail: AtomicBool::new(false),
            failure_mode: RwLock::new(FailureMode::None),
            id_counter: AtomicUsize::new(0),
            call_counts: CallCounts::default(),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Set whether operations should fail or not
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::Relaxed);
    }

    /// Set the specific failure mode to simulate
    pub async fn set_failure_mode(&self, mode: FailureMode) {
        *self.failure_mode.write().await = mode;
    }

    /// Add a volume with display name `name` and `labels`
    pub async fn add_volume(&self, id: &str, name: &str, labels: &[(&str, &str)]) {
        let volume = Volume {
            id: id.to_string(),
            locator: VolumeLocator {
                name: name.to_string(),
                volume_labels: labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            },
            readonly: false,
        };
        self.volumes.write().await.insert(id.to_string(), volume);
    }

    pub async fn get_volume(&self, id: &str) -> Option<Volume> {
        self.volumes.read().await.get(id).cloned()
    }

    /// Add a backup to the list returned by enumerate
    pub async fn add_backup(&self, id: &str, src_volume_id: &str, src_volume_name: &str) {
        self.backups.write().await.push(CloudBackupInfo {
            id: id.to_string(),
            src_volume_id: src_volume_id.to_string(),
            src_volume_name: src_volume_name.to_string(),
            status: "Done".to_string(),
        });
    }

    /// Queue the handle returned by the next backup create or restore
    pub async fn push_job_name(&self, name: &str) {
        self.job_names.write().await.push_back(name.to_string());
    }

    /// Script the answers to status queries for `job`
    pub async fn script_status(&self, job: &str, steps: Vec<StatusStep>) {
        self.status_scripts
            .write()
            .await
            .insert(job.to_string(), steps.into());
    }

    /// Get the count of all operation calls
    pub fn get_call_counts(&self) -> CallCounts {
        self.call_counts.clone()
    }

    /// Get all recorded requests
    pub async fn get_requests(&self) -> Vec<MockRequest> {
        self.requests.read().await.clone()
    }

    async fn record(&self, request: MockRequest) {
        self.requests.write().await.push(request);
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }

    async fn next_job_name(&self) -> String {
        match self.job_names.write().await.pop_front() {
            Some(name) => name,
            None => self.next_id("job"),
        }
    }

    /// Helper method to handle failures based on current settings
    async fn handle_failure(&self) -> Result<(), Error> {
        if self.should_fail.load(Ordering::Relaxed) {
            let value = *self.failure_mode.read().await;
            match value {
                FailureMode::None => Err(make_err!(Code::Internal, "Simulated generic failure")),
                FailureMode::NotFound => {
                    Err(make_err!(Code::NotFound, "Simulated not found error"))
                }
                FailureMode::NetworkError => {
                    Err(make_err!(Code::Unavailable, "Simulated network error"))
                }
                FailureMode::Unauthorized => Err(make_err!(
                    Code::Unauthenticated,
                    "Simulated authentication failure"
                )),
                FailureMode::ServerError => {
                    Err(make_err!(Code::Internal, "Simulated server error"))
                }
            }
        } else {
            Ok(())
        }
    }
}

impl Default for MockVolumeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VolumeDriver for MockVolumeDriver {
    async fn inspect(&self, volume_id: &str) -> Result<Vec<Volume>, Error> {
        bump(&self.call_counts.inspect_calls);
        self.record(MockRequest::Inspect {
            volume_id: volume_id.to_string(),
        })
        .await;
        self.handle_failure().await?;

        Ok(self
            .volumes
            .read()
            .await
            .get(volume_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn snapshot(
        &self,
        volume_id: &str,
        readonly: bool,
        locator: VolumeLocator,
        no_retry: bool,
    ) -> Result<String, Error> {
        bump(&self.call_counts.snapshot_calls);
        self.record(MockRequest::Snapshot {
            volume_id: volume_id.to_string(),
            readonly,
            locator: locator.clone(),
            no_retry,
        })
        .await;
        self.handle_failure().await?;

        let mut volumes = self.volumes.write().await;
        if !volumes.contains_key(volume_id) {
            return Err(make_err!(Code::NotFound, "Volume {volume_id} not found"));
        }
        let id = self.next_id(if readonly { "snap" } else { "vol" });
        volumes.insert(
            id.clone(),
            Volume {
                id: id.clone(),
                locator,
                readonly,
            },
        );
        Ok(id)
    }

    async fn delete(&self, volume_id: &str) -> Result<(), Error> {
        bump(&self.call_counts.delete_calls);
        self.record(MockRequest::Delete {
            volume_id: volume_id.to_string(),
        })
        .await;
        self.handle_failure().await?;

        match self.volumes.write().await.remove(volume_id) {
            Some(_) => Ok(()),
            None => Err(make_err!(Code::NotFound, "Volume {volume_id} not found")),
        }
    }

    async fn cloud_backup_create(
        &self,
        request: CloudBackupCreateRequest,
    ) -> Result<CloudBackupCreateResponse, Error> {
        bump(&self.call_counts.backup_create_calls);
        self.record(MockRequest::BackupCreate(request)).await;
        self.handle_failure().await?;

        Ok(CloudBackupCreateResponse {
            name: self.next_job_name().await,
        })
    }

    async fn cloud_backup_enumerate(
        &self,
        request: CloudBackupEnumerateRequest,
    ) -> Result<CloudBackupEnumerateResponse, Error> {
        bump(&self.call_counts.backup_enumerate_calls);
        self.record(MockRequest::BackupEnumerate(request)).await;
        self.handle_failure().await?;

        Ok(CloudBackupEnumerateResponse {
            backups: self.backups.read().await.clone(),
        })
    }

    async fn cloud_backup_restore(
        &self,
        request: CloudBackupRestoreRequest,
    ) -> Result<CloudBackupRestoreResponse, Error> {
        bump(&self.call_counts.backup_restore_calls);
        let restore_volume_id = self.next_id("vol");
        self.record(MockRequest::BackupRestore(request)).await;
        self.handle_failure().await?;

        Ok(CloudBackupRestoreResponse {
            restore_volume_id,
            name: self.next_job_name().await,
        })
    }

    async fn cloud_backup_status(
        &self,
        request: CloudBackupStatusRequest,
    ) -> Result<CloudBackupStatusResponse, Error> {
        bump(&self.call_counts.backup_status_calls);
        let job = request.id.clone();
        self.record(MockRequest::BackupStatus(request)).await;
        self.handle_failure().await?;

        let step = {
            let mut scripts = self.status_scripts.write().await;
            match scripts.get_mut(&job) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            }
        };
        let mut statuses = HashMap::new();
        match step {
            Some(StatusStep::Status(status)) => {
                statuses.insert(job, status);
            }
            Some(StatusStep::Error(err)) => return Err(err),
            Some(StatusStep::Hang) => pending::<()>().await,
            Some(StatusStep::Missing) | None => {}
        }
        Ok(CloudBackupStatusResponse { statuses })
    }

    async fn cloud_backup_delete(&self, request: CloudBackupDeleteRequest) -> Result<(), Error> {
        bump(&self.call_counts.backup_delete_calls);
        let id = request.id.clone();
        self.record(MockRequest::BackupDelete(request)).await;
        self.handle_failure().await?;

        let mut backups = self.backups.write().await;
        let before = backups.len();
        backups.retain(|backup| backup.id != id);
        if backups.len() == before {
            return Err(make_err!(Code::NotFound, "Backup {id} not found"));
        }
        Ok(())
    }
}

/// Hands out one shared [`MockVolumeDriver`] and remembers the tokens it was
/// asked to connect with.
#[derive(Debug, Default)]
pub struct MockConnector {
    driver: Arc<MockVolumeDriver>,
    tokens: std::sync::Mutex<Vec<String>>,
    should_fail: AtomicBool,
}

impl MockConnector {
    pub fn new(driver: Arc<MockVolumeDriver>) -> Self {
        Self {
            driver,
            tokens: std::sync::Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::Relaxed);
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }
}

impl DriverConnector for MockConnector {
    fn connect(
        &self,
        _endpoint: &str,
        token: &str,
    ) -> Result<Arc<dyn VolumeDriver>, Error> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(make_err!(Code::Internal, "Simulated connection failure"));
        }
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(token.to_string());
        }
        Ok(self.driver.clone())
    }
}
