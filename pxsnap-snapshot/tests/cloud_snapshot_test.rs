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

use core::sync::atomic::Ordering;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use pxsnap_config::snapshot::{PluginSpec, Retry, WaitSpec};
use pxsnap_driver::endpoint::StaticEndpoint;
use pxsnap_driver::mocks::{MockConnector, MockRequest, MockVolumeDriver, StatusStep};
use pxsnap_driver::session::ClientSession;
use pxsnap_driver::types::{
    CloudBackupCreateRequest, CloudBackupDeleteRequest, CloudBackupEnumerateRequest,
    CloudBackupStatusType,
};
use pxsnap_error::{Code, Error, make_err};
use pxsnap_macro::pxsnap_test;
use pxsnap_snapshot::cloud::{CLOUD_VOLUME_TYPE, CloudSnapshot, RESTORED_VOLUME_PREFIX};
use pxsnap_snapshot::strategy::SnapshotStrategy;
use pxsnap_snapshot::waiter::CompletionWaiter;
use tokio_util::sync::CancellationToken;

fn make_strategy(driver: &Arc<MockVolumeDriver>, credential_id: &str) -> CloudSnapshot {
    make_strategy_with_retry(driver, credential_id, Retry::default())
}

fn make_strategy_with_retry(
    driver: &Arc<MockVolumeDriver>,
    credential_id: &str,
    query_retry: Retry,
) -> CloudSnapshot {
    let session = Arc::new(ClientSession::new(
        String::new(),
        None,
        Arc::new(StaticEndpoint("http://10.0.0.1:9001".to_string())),
        Arc::new(MockConnector::new(driver.clone())),
    ));
    let wait = WaitSpec {
        poll_interval: Duration::from_secs(5),
        timeout: Duration::from_secs(600),
        query_retry,
    };
    let mut strategy =
        CloudSnapshot::new(session, CompletionWaiter::new(&wait, CancellationToken::new()));
    let config = HashMap::from([
        ("type".to_string(), "cloud".to_string()),
        ("credId".to_string(), credential_id.to_string()),
    ]);
    strategy
        .initialize(&PluginSpec::from_config_map(&config).unwrap())
        .unwrap();
    strategy
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_waits_for_backup_id() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-9").await;
    driver
        .script_status(
            "job-9",
            vec![
                StatusStep::status(CloudBackupStatusType::Queued),
                StatusStep::status(CloudBackupStatusType::Active),
                StatusStep::done("bk-42"),
            ],
        )
        .await;
    let strategy = make_strategy(&driver, "cred-1");

    let backup_id = strategy
        .create_snapshot("vol-X", "", &HashMap::new())
        .await?;

    assert_eq!(backup_id, "bk-42");
    let requests = driver.get_requests().await;
    assert_eq!(
        requests[0],
        MockRequest::BackupCreate(CloudBackupCreateRequest {
            volume_id: "vol-X".to_string(),
            credential_uuid: "cred-1".to_string(),
            full: true,
        })
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_allows_empty_credential() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-1").await;
    driver
        .script_status("job-1", vec![StatusStep::done("bk-1")])
        .await;
    let strategy = make_strategy(&driver, "");

    assert_eq!(
        strategy
            .create_snapshot("vol-1", "", &HashMap::new())
            .await?,
        "bk-1"
    );
    let requests = driver.get_requests().await;
    let MockRequest::BackupCreate(request) = &requests[0] else {
        panic!("Expected backup create, got {:?}", requests[0]);
    };
    assert_eq!(request.credential_uuid, "");
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_reports_failed_job() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-1").await;
    driver
        .script_status(
            "job-1",
            vec![StatusStep::status(CloudBackupStatusType::Failed)],
        )
        .await;
    let strategy = make_strategy(&driver, "cred-1");

    let err = strategy
        .create_snapshot("vol-1", "", &HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::Aborted);
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn restore_matches_backup_id_exactly() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_backup("bk-1", "vol-1", "pvc-one").await;
    driver.add_backup("bk-2", "vol-2", "pvc-two").await;
    driver.push_job_name("restore-1").await;
    driver
        .script_status(
            "restore-1",
            vec![
                StatusStep::status(CloudBackupStatusType::Active),
                StatusStep::status(CloudBackupStatusType::Done),
            ],
        )
        .await;
    let strategy = make_strategy(&driver, "cred-1");

    let volume_name = strategy
        .create_volume_from_snapshot("bk-2", CLOUD_VOLUME_TYPE, "", None)
        .await?;

    assert!(volume_name.starts_with(RESTORED_VOLUME_PREFIX), "{volume_name}");
    assert_eq!(volume_name.len(), RESTORED_VOLUME_PREFIX.len() + 36);

    let requests = driver.get_requests().await;
    assert_eq!(
        requests[0],
        MockRequest::BackupEnumerate(CloudBackupEnumerateRequest {
            credential_uuid: "cred-1".to_string(),
            cloud_backup_id: "bk-2".to_string(),
        })
    );
    let MockRequest::BackupRestore(restore) = &requests[1] else {
        panic!("Expected backup restore, got {:?}", requests[1]);
    };
    assert_eq!(restore.id, "bk-2");
    assert_eq!(restore.credential_uuid, "cred-1");
    assert_eq!(restore.restore_volume_name, volume_name);
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn restore_generates_distinct_names() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_backup("bk-1", "vol-1", "pvc-one").await;
    let strategy = make_strategy(&driver, "cred-1");
    driver.push_job_name("restore-1").await;
    driver.push_job_name("restore-2").await;
    driver
        .script_status("restore-1", vec![StatusStep::status(CloudBackupStatusType::Done)])
        .await;
    driver
        .script_status("restore-2", vec![StatusStep::status(CloudBackupStatusType::Done)])
        .await;

    let first = strategy
        .create_volume_from_snapshot("bk-1", "", "", None)
        .await?;
    let second = strategy
        .create_volume_from_snapshot("bk-1", "", "", None)
        .await?;

    assert!(first != second, "{first} == {second}");
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn restore_of_unknown_backup_is_not_found() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_backup("bk-1", "vol-1", "pvc-one").await;
    driver.add_backup("bk-2", "vol-2", "pvc-two").await;
    let strategy = make_strategy(&driver, "cred-1");

    let err = strategy
        .create_volume_from_snapshot("bk-3", "", "", None)
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::NotFound);
    assert_eq!(
        err.messages[0],
        "could not find backup associated with ID: bk-3"
    );
    assert_eq!(driver.get_requests().await.len(), 1);
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn delete_is_not_forced() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_backup("bk-1", "vol-1", "pvc-one").await;
    let strategy = make_strategy(&driver, "cred-1");

    strategy.delete_snapshot("bk-1").await?;

    assert_eq!(
        driver.get_requests().await,
        vec![MockRequest::BackupDelete(CloudBackupDeleteRequest {
            id: "bk-1".to_string(),
            credential_uuid: "cred-1".to_string(),
            force: false,
        })]
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn delete_of_missing_backup_propagates() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    let strategy = make_strategy(&driver, "cred-1");

    let err = strategy.delete_snapshot("bk-404").await.unwrap_err();

    assert_eq!(err.code, Code::NotFound);
    Ok(())
}

#[pxsnap_test]
async fn describe_reports_cloud_type() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    let strategy = make_strategy(&driver, "cred-1");

    assert_eq!(
        strategy.describe_volume("vol-1", "")?,
        (CLOUD_VOLUME_TYPE.to_string(), None)
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn restore_does_not_match_on_prefix() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_backup("bk-10", "vol-A", "pvc-a").await;
    driver.add_backup("bk-2", "vol-A", "pvc-a").await;
    let strategy = make_strategy(&driver, "cred-1");

    let err = strategy
        .create_volume_from_snapshot("bk-1", "", "", None)
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::NotFound);
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_uses_status_returned_by_wait() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-9").await;
    // Any further status read would fail.
    driver
        .script_status(
            "job-9",
            vec![
                StatusStep::done("bk-42"),
                StatusStep::Error(make_err!(Code::Unavailable, "control plane restarting")),
            ],
        )
        .await;
    let strategy = make_strategy(&driver, "cred-1");

    let backup_id = strategy
        .create_snapshot("vol-X", "", &HashMap::new())
        .await?;

    assert_eq!(backup_id, "bk-42");
    assert_eq!(
        driver
            .get_call_counts()
            .backup_status_calls
            .load(Ordering::Relaxed),
        1
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_rereads_missing_backup_id_with_retries() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-9").await;
    driver
        .script_status(
            "job-9",
            vec![
                StatusStep::status(CloudBackupStatusType::Done),
                StatusStep::Error(make_err!(Code::Unavailable, "control plane restarting")),
                StatusStep::done("bk-42"),
            ],
        )
        .await;
    let strategy = make_strategy_with_retry(
        &driver,
        "cred-1",
        Retry {
            max_retries: 2,
            delay: 0.1,
            jitter: 0.,
            retry_on_errors: None,
        },
    );

    let backup_id = strategy
        .create_snapshot("vol-X", "", &HashMap::new())
        .await?;

    assert_eq!(backup_id, "bk-42");
    assert_eq!(
        driver
            .get_call_counts()
            .backup_status_calls
            .load(Ordering::Relaxed),
        3
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn create_snapshot_without_backup_id_is_internal() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-9").await;
    driver
        .script_status(
            "job-9",
            vec![StatusStep::status(CloudBackupStatusType::Done)],
        )
        .await;
    let strategy = make_strategy(&driver, "cred-1");

    let err = strategy
        .create_snapshot("vol-X", "", &HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::Internal);
    assert!(err.to_string().contains("without a backup id"), "{err}");
    Ok(())
}
