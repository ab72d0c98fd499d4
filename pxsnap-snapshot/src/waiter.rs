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
use core::time::Duration;

use futures::stream::unfold;
use pxsnap_config::snapshot::WaitSpec;
use pxsnap_driver::operations::VolumeDriver;
use pxsnap_driver::types::{CloudBackupOpType, CloudBackupStatus, CloudBackupStatusRequest, JobPhase};
use pxsnap_error::{Code, Error, ResultExt, make_err};
use pxsnap_util::retry::{Retrier, RetryResult};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

/// Polls a control plane job until it reaches a terminal phase.
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    poll_interval: Duration,
    timeout: Duration,
    retrier: Retrier,
    cancel: CancellationToken,
}

impl CompletionWaiter {
    pub fn new(spec: &WaitSpec, cancel: CancellationToken) -> Self {
        Self::new_with_retrier(
            spec,
            Retrier::with_tokio_sleep(spec.query_retry.clone()),
            cancel,
        )
    }

    pub const fn new_with_retrier(
        spec: &WaitSpec,
        retrier: Retrier,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            poll_interval: spec.poll_interval,
            timeout: spec.timeout,
            retrier,
            cancel,
        }
    }

    /// Fetches the current status of `job`, retrying transient query
    /// failures. `None` means the control plane does not know the job yet.
    pub async fn query_status(
        &self,
        driver: &dyn VolumeDriver,
        job: &str,
    ) -> Result<Option<CloudBackupStatus>, Error> {
        self.retrier
            .retry(unfold((), move |()| async move {
                let request = CloudBackupStatusRequest { id: job.to_string() };
                let result = match driver.cloud_backup_status(request).await {
                    Ok(mut response) => RetryResult::Ok(response.statuses.remove(job)),
                    Err(err) => RetryResult::Retry(err),
                };
                Some((result, ()))
            }))
            .await
    }

    /// Waits for `job` to finish. Returns the terminal status on success.
    ///
    /// The first poll happens immediately. A job missing from the status map
    /// counts as still queued. The deadline also bounds a status query that
    /// never returns.
    pub async fn wait(
        &self,
        driver: &dyn VolumeDriver,
        job: &str,
        op: CloudBackupOpType,
    ) -> Result<CloudBackupStatus, Error> {
        // A timeout past the end of the clock never fires.
        let deadline = Instant::now().checked_add(self.timeout);
        let expired = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(make_err!(Code::Cancelled, "Wait for {op} job {job} cancelled"))
            }
            () = expired => Err(self.timeout_error(job, op)),
            result = self.poll_until_done(driver, job, op) => result,
        }
    }

    async fn poll_until_done(
        &self,
        driver: &dyn VolumeDriver,
        job: &str,
        op: CloudBackupOpType,
    ) -> Result<CloudBackupStatus, Error> {
        let mut polls: u64 = 0;
        loop {
            polls += 1;
            let status = self
                .query_status(driver, job)
                .await
                .err_tip(|| format!("Querying status of {op} job {job}"))?;

            match status {
                Some(status) => match status.status.phase() {
                    JobPhase::Completed => {
                        event!(Level::INFO, %job, %op, polls, "Job completed");
                        return Ok(status);
                    }
                    JobPhase::Failed => {
                        event!(Level::ERROR, %job, %op, status = ?status.status, info = ?status.info, "Job failed");
                        return Err(make_err!(
                            Code::Aborted,
                            "{op} job {job} failed with status {:?}: {}",
                            status.status,
                            status.info.join("; ")
                        ));
                    }
                    phase @ (JobPhase::Queued | JobPhase::Active) => {
                        event!(Level::DEBUG, %job, %op, ?phase, polls, "Job still running");
                    }
                },
                None => {
                    event!(Level::DEBUG, %job, %op, polls, "Job not registered yet");
                }
            }

            sleep(self.poll_interval).await;
        }
    }

    fn timeout_error(&self, job: &str, op: CloudBackupOpType) -> Error {
        event!(Level::ERROR, %job, %op, timeout = ?self.timeout, "Timed out waiting for job");
        make_err!(
            Code::DeadlineExceeded,
            "{op} job {job} did not finish within {:?}",
            self.timeout
        )
    }
}
