//! Platform lifecycle tests

#![cfg(unix)]

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use apphost::errors::PlatformError;
use apphost::models::app::AppStatus;
use apphost::models::deployment::DeploymentStatus;
use apphost::platform::Platform;
use apphost::storage::layout::StorageLayout;
use apphost::store::apps::AppRepository;
use apphost::store::deployments::DeploymentRepository;
use apphost::store::memory::MemoryStore;
use apphost::supervisor::fsm::ProcessState;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::common::{
    faulty_harness, harness, new_app, options, wait_for_status, CRASH_SCRIPT, OWNER, SERVE_SCRIPT,
};

fn archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_create_app_allocates_port_and_routes() {
    let h = harness().await;

    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    assert_eq!(app.port, 9100);
    assert_eq!(app.status, AppStatus::Stopped);
    assert!(app.active_deployment_id.is_none());

    let routes = h.platform.proxy().config_file(&app.id).read_string().await.unwrap();
    assert!(routes.contains("blog.apps.test"));
    assert!(routes.contains("reverse_proxy 127.0.0.1:9100"));
}

#[tokio::test]
async fn test_create_app_rejects_taken_subdomain() {
    let h = harness().await;

    h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    let err = h.platform.create_app("user-2", new_app("Blog")).await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));

    // The failed attempt must not hold on to a port
    let next = h.platform.create_app(OWNER, new_app("shop")).await.unwrap();
    assert_eq!(next.port, 9101);
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_ports() {
    let h = harness().await;

    let creates = (0..12).map(|i| {
        let platform = &h.platform;
        async move { platform.create_app(OWNER, new_app(&format!("app{}", i))).await }
    });
    let apps: Vec<_> = futures::future::join_all(creates)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    let ports: HashSet<u16> = apps.iter().map(|app| app.port).collect();
    assert_eq!(ports.len(), 12);
    assert!(ports.iter().all(|port| (9100..9112).contains(port)));
}

#[tokio::test]
async fn test_other_owner_is_forbidden() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let err = assert_err!(h.platform.stop("intruder", &app.id).await);
    assert!(matches!(err, PlatformError::Forbidden(_)));

    let err = assert_err!(h.platform.get_app(OWNER, "missing").await);
    assert!(matches!(err, PlatformError::NotFound(_)));
}

#[tokio::test]
async fn test_deploy_twice_supersedes_first_release() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let first = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(first.status, DeploymentStatus::Active);
    let first_pid = h.platform.supervisor().pid(&app.id).unwrap();

    let second = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    assert_eq!(second.version, 2);

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    let statuses: Vec<_> = deployments.iter().map(|d| d.status).collect();
    assert_eq!(statuses, vec![DeploymentStatus::Inactive, DeploymentStatus::Active]);

    let app = h.platform.app(&app.id).await.unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(app.active_deployment_id.as_deref(), Some(second.id.as_str()));
    assert_ne!(h.platform.supervisor().pid(&app.id), Some(first_pid));

    let current = h.layout.current_link(&app.id).target().await.unwrap();
    assert_eq!(current, Some(second.artifact_path.clone()));

    assert_eq!(h.platform.shutdown().await, 1);
}

#[tokio::test]
async fn test_failed_deploy_leaves_running_release_untouched() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let good = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    let pid = h.platform.supervisor().pid(&app.id);
    let before = h.platform.app(&app.id).await.unwrap();

    let bad = archive(&[("README.md", "no entry point here")]);
    let err = h.platform.deploy(OWNER, &app.id, "site.zip", bad).await.unwrap_err();
    assert!(matches!(err, PlatformError::ArtifactError(_)));

    let after = h.platform.app(&app.id).await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.active_deployment_id.as_deref(), Some(good.id.as_str()));
    assert_eq!(h.platform.supervisor().pid(&app.id), pid);

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0].status, DeploymentStatus::Active);
    assert_eq!(deployments[1].status, DeploymentStatus::Failed);
    assert!(deployments[1].error_message.is_some());
    assert!(!deployments[1].artifact_path.exists());

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_first_deploy_without_entry_point_leaves_app_untouched() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let bad = archive(&[("README.md", "no entry point here"), ("public/index.html", "<h1>hi</h1>")]);
    let err = h.platform.deploy(OWNER, &app.id, "site.zip", bad).await.unwrap_err();
    assert!(matches!(err, PlatformError::ArtifactError(_)));

    let after = h.platform.app(&app.id).await.unwrap();
    assert_eq!(after.status, AppStatus::Stopped);
    assert!(after.active_deployment_id.is_none());
    assert!(after.pid.is_none());
    assert_eq!(h.layout.current_link(&app.id).target().await.unwrap(), None);
    assert!(!h.platform.supervisor().is_running(&app.id));

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].status, DeploymentStatus::Failed);
    assert!(deployments[0].error_message.as_deref().unwrap().contains("start"));
    assert!(!deployments[0].artifact_path.exists());
}

#[tokio::test]
async fn test_app_reports_building_while_deploying() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("stubborn")).await.unwrap();

    // The running release ignores SIGTERM, so replacing it takes the full grace period
    let stubborn = "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 1; done\n";
    h.platform
        .deploy(OWNER, &app.id, "start", stubborn.as_bytes().to_vec())
        .await
        .unwrap();

    let deploy = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec());
    let observe = async {
        for _ in 0..200 {
            if h.platform.app(&app.id).await.unwrap().status == AppStatus::Building {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    };
    let (deployed, saw_building) = tokio::join!(deploy, observe);

    assert_ok!(deployed);
    assert!(saw_building);
    assert_eq!(h.platform.app(&app.id).await.unwrap().status, AppStatus::Running);

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_empty_artifact_is_rejected() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let err = h.platform.deploy(OWNER, &app.id, "start", Vec::new()).await.unwrap_err();
    assert!(matches!(err, PlatformError::ArtifactError(_)));
    assert_eq!(h.platform.app(&app.id).await.unwrap().status, AppStatus::Stopped);
}

#[tokio::test]
async fn test_archive_deploy_runs_entry_point() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let bundle = archive(&[("start", SERVE_SCRIPT), ("public/index.html", "<h1>hi</h1>")]);
    let deployment = h.platform.deploy(OWNER, &app.id, "site.zip", bundle).await.unwrap();

    assert!(deployment.artifact_path.join("public/index.html").exists());
    assert!(h.platform.supervisor().is_running(&app.id));

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_rollback_restores_previous_release() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let first = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    let second = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    let restored = h.platform.rollback(OWNER, &app.id, &first.id).await.unwrap();
    assert_eq!(restored.status, DeploymentStatus::Active);

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    let active: Vec<_> = deployments
        .iter()
        .filter(|d| d.status == DeploymentStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);
    assert!(deployments
        .iter()
        .any(|d| d.id == second.id && d.status == DeploymentStatus::Inactive));

    let app = h.platform.app(&app.id).await.unwrap();
    assert_eq!(app.active_deployment_id.as_deref(), Some(first.id.as_str()));
    assert_eq!(app.status, AppStatus::Running);

    // Only inactive deployments can be rolled back to
    let err = h.platform.rollback(OWNER, &app.id, &first.id).await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_failed_rollback_keeps_a_single_active_deployment() {
    let h = faulty_harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let first = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    let second = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    let pid = h.platform.supervisor().pid(&app.id);

    h.store.freeze_activation();
    let err = h.platform.rollback(OWNER, &app.id, &first.id).await.unwrap_err();
    assert!(matches!(err, PlatformError::StoreError(_)));

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    let active: Vec<_> = deployments
        .iter()
        .filter(|d| d.status == DeploymentStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
    assert_eq!(deployments[0].status, DeploymentStatus::Inactive);

    let record = h.platform.app(&app.id).await.unwrap();
    assert_eq!(record.active_deployment_id.as_deref(), Some(second.id.as_str()));
    assert_eq!(record.status, AppStatus::Running);
    let current = h.layout.current_link(&app.id).target().await.unwrap();
    assert_eq!(current, Some(second.artifact_path.clone()));
    assert_eq!(h.platform.supervisor().pid(&app.id), pid);

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_failed_activation_marks_new_deployment_failed() {
    let h = faulty_harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    let good = h
        .platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    h.store.freeze_activation();
    assert_err!(
        h.platform
            .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
            .await
    );

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0].status, DeploymentStatus::Active);
    assert_eq!(deployments[1].status, DeploymentStatus::Failed);

    let record = h.platform.app(&app.id).await.unwrap();
    assert_eq!(record.active_deployment_id.as_deref(), Some(good.id.as_str()));
    assert_eq!(record.status, AppStatus::Running);
    let current = h.layout.current_link(&app.id).target().await.unwrap();
    assert_eq!(current, Some(good.artifact_path.clone()));

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_old_deployments_are_pruned() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let mut released = Vec::new();
    for _ in 0..7 {
        let deployment = h
            .platform
            .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
            .await
            .unwrap();
        released.push(deployment);
    }

    let deployments = h.platform.list_deployments(OWNER, &app.id).await.unwrap();
    let versions: Vec<_> = deployments.iter().map(|d| d.version).collect();
    assert_eq!(versions, vec![3, 4, 5, 6, 7]);
    assert_eq!(deployments[4].status, DeploymentStatus::Active);
    assert!(!released[0].artifact_path.exists());
    assert!(!released[1].artifact_path.exists());
    assert!(released[6].artifact_path.exists());

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_stop_without_process_is_noop() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    assert!(!assert_ok!(h.platform.stop(OWNER, &app.id).await));
    assert_eq!(h.platform.app(&app.id).await.unwrap().status, AppStatus::Stopped);

    let err = assert_err!(h.platform.start(OWNER, &app.id).await);
    assert!(matches!(err, PlatformError::ValidationError(_)));
}

#[tokio::test]
async fn test_stop_then_start_again() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    h.platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    assert!(h.platform.stop(OWNER, &app.id).await.unwrap());
    let stopped = h.platform.app(&app.id).await.unwrap();
    assert_eq!(stopped.status, AppStatus::Stopped);
    assert!(stopped.pid.is_none());
    assert_eq!(h.platform.supervisor().state(&app.id), ProcessState::Stopped);

    let info = h.platform.start(OWNER, &app.id).await.unwrap();
    assert_eq!(info.state, ProcessState::Running);
    assert_eq!(h.platform.app(&app.id).await.unwrap().pid, info.pid);

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_stop_kills_process_ignoring_sigterm() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("stubborn")).await.unwrap();

    let script = "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 1; done\n";
    h.platform
        .deploy(OWNER, &app.id, "start", script.as_bytes().to_vec())
        .await
        .unwrap();

    let started = std::time::Instant::now();
    assert!(h.platform.stop(OWNER, &app.id).await.unwrap());
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.platform.app(&app.id).await.unwrap().status, AppStatus::Stopped);
}

#[tokio::test]
async fn test_crash_is_detected_and_logged() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("flaky")).await.unwrap();

    h.platform
        .deploy(OWNER, &app.id, "start", CRASH_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    assert!(wait_for_status(&h.platform, &app.id, AppStatus::Crashed).await);
    assert!(!h.platform.supervisor().is_running(&app.id));
    assert!(h.platform.app(&app.id).await.unwrap().pid.is_none());

    let logs = h.platform.get_logs(OWNER, &app.id, 10).await.unwrap();
    assert!(logs.iter().any(|entry| entry.message == "boom"));
}

#[tokio::test]
async fn test_crash_report_does_not_clobber_newer_process() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("flaky")).await.unwrap();

    // First run crashes while a background child keeps its output open,
    // so the exit watcher is still draining when the next start lands.
    let script = "#!/bin/sh\n\
        if [ -f ./ran ]; then echo again; exec sleep 30; fi\n\
        touch ./ran\n\
        sleep 1 &\n\
        exit 1\n";
    h.platform
        .deploy(OWNER, &app.id, "start", script.as_bytes().to_vec())
        .await
        .unwrap();

    let mut polls = 0;
    while h.platform.supervisor().state(&app.id) != ProcessState::Stopped {
        polls += 1;
        assert!(polls < 400, "process never exited");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let info = h.platform.start(OWNER, &app.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    let record = h.platform.app(&app.id).await.unwrap();
    assert_eq!(record.status, AppStatus::Running);
    assert_eq!(record.pid, info.pid);
    assert!(h.platform.supervisor().is_running(&app.id));

    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_live_logs_reach_subscriber() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let (connection, mut rx) = h.platform.connect_logs();
    h.platform.subscribe_logs(OWNER, connection, &app.id).await.unwrap();

    h.platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    let entry = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.app_id, app.id);
    assert_eq!(entry.message, "serving on 9100");

    h.platform.disconnect_logs(connection).await;
    h.platform.shutdown().await;
}

#[tokio::test]
async fn test_delete_app_frees_port_and_routes() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    h.platform.add_domain(OWNER, &app.id, "www.blog.io").await.unwrap();
    h.platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();

    h.platform.delete_app(OWNER, &app.id).await.unwrap();

    assert!(!h.platform.supervisor().is_running(&app.id));
    assert!(!h.platform.proxy().config_file(&app.id).exists().await);
    assert!(!h.layout.app_dir(&app.id).exists().await);
    assert!(matches!(
        h.platform.app(&app.id).await.unwrap_err(),
        PlatformError::NotFound(_)
    ));

    // Port and hostnames are free again
    let mut reborn = new_app("blog");
    reborn.name = "blog again".to_string();
    let again = h.platform.create_app(OWNER, reborn).await.unwrap();
    assert_eq!(again.port, app.port);
    h.platform.add_domain(OWNER, &again.id, "www.blog.io").await.unwrap();
}

#[tokio::test]
async fn test_failed_delete_keeps_hostnames_and_port_claimed() {
    let h = faulty_harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    h.platform.add_domain(OWNER, &app.id, "www.blog.io").await.unwrap();

    h.store.fail_app_deletes();
    assert_err!(h.platform.delete_app(OWNER, &app.id).await);

    assert_ok!(h.platform.app(&app.id).await);
    let err = h.platform.create_app(OWNER, new_app("blog")).await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));

    let shop = h.platform.create_app(OWNER, new_app("shop")).await.unwrap();
    assert_ne!(shop.port, app.port);
    let err = h.platform.add_domain(OWNER, &shop.id, "www.blog.io").await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));
}

#[tokio::test]
async fn test_domains_are_exclusive() {
    let h = harness().await;
    let blog = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    let shop = h.platform.create_app(OWNER, new_app("shop")).await.unwrap();

    let blog = h.platform.add_domain(OWNER, &blog.id, "WWW.Example.com").await.unwrap();
    assert!(blog.domains.contains("www.example.com"));

    let err = h.platform.add_domain(OWNER, &shop.id, "www.example.com").await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));

    let err = h.platform.add_domain(OWNER, &shop.id, "localhost").await.unwrap_err();
    assert!(matches!(err, PlatformError::ValidationError(_)));

    h.platform.remove_domain(OWNER, &blog.id, "www.example.com").await.unwrap();
    h.platform.add_domain(OWNER, &shop.id, "www.example.com").await.unwrap();
}

#[tokio::test]
async fn test_primary_hostname_cannot_be_added_as_domain() {
    let h = harness().await;
    let blog = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();

    let err = h.platform.add_domain(OWNER, &blog.id, "blog.apps.test").await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));
    assert!(h.platform.app(&blog.id).await.unwrap().domains.is_empty());

    let err = h.platform.remove_domain(OWNER, &blog.id, "blog.apps.test").await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound(_)));

    // The subdomain is still claimed by the first app
    let err = h.platform.create_app(OWNER, new_app("blog")).await.unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));
}

#[tokio::test]
async fn test_app_name_with_control_characters_is_rejected() {
    let h = harness().await;
    let mut new = new_app("blog");
    new.name = "blog\n}\nevil.example.com {".to_string();

    let err = h.platform.create_app(OWNER, new).await.unwrap_err();
    assert!(matches!(err, PlatformError::ValidationError(_)));
    assert!(h.platform.all_apps().await.unwrap().is_empty());

    // The subdomain was never claimed
    assert_ok!(h.platform.create_app(OWNER, new_app("blog")).await);
}

#[tokio::test]
async fn test_recover_resets_interrupted_state() {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.setup().await.unwrap();

    let store = Arc::new(MemoryStore::open(layout.store_file()).await.unwrap());
    let platform = Platform::new(store.clone(), layout.clone(), options(&layout)).unwrap();
    let app = platform.create_app(OWNER, new_app("blog")).await.unwrap();
    let active = platform
        .deploy(OWNER, &app.id, "start", SERVE_SCRIPT.as_bytes().to_vec())
        .await
        .unwrap();
    platform.shutdown().await;

    // Leave behind what a platform killed mid-deploy would
    AppRepository::new(store.clone())
        .update(&app.id, |record| {
            record.status = AppStatus::Running;
            record.pid = Some(4_000_000);
        })
        .await
        .unwrap();
    let interrupted_dir = layout.release_dir(&app.id, "interrupted");
    interrupted_dir.create().await.unwrap();
    let mut interrupted = active.clone();
    interrupted.id = "interrupted".to_string();
    interrupted.status = DeploymentStatus::Building;
    interrupted.artifact_path = interrupted_dir.path().to_path_buf();
    DeploymentRepository::new(store.clone())
        .create_next(interrupted)
        .await
        .unwrap();
    let orphan = layout.release_dir(&app.id, "orphan");
    orphan.create().await.unwrap();
    store.flush().await.unwrap();
    drop(platform);

    // Restart from the snapshot
    let store = Arc::new(MemoryStore::open(layout.store_file()).await.unwrap());
    let restarted = Platform::new(store, layout.clone(), options(&layout)).unwrap();
    let report = restarted.recover().await.unwrap();
    assert_eq!(report.apps_reset, 1);
    assert_eq!(report.deployments_failed, 1);
    assert_eq!(report.releases_removed, 1);
    assert!(!orphan.exists().await);
    assert!(!interrupted_dir.exists().await);

    let app = restarted.app(&app.id).await.unwrap();
    assert_eq!(app.status, AppStatus::Stopped);
    assert!(app.pid.is_none());
    assert!(restarted.proxy().config_file(&app.id).exists().await);

    let deployments = restarted.list_deployments(OWNER, &app.id).await.unwrap();
    assert_eq!(deployments[0].status, DeploymentStatus::Active);
    assert_eq!(deployments[1].status, DeploymentStatus::Failed);
    assert_eq!(
        deployments[1].error_message.as_deref(),
        Some("Interrupted by platform restart")
    );

    // The active release survives and can be started again
    let info = restarted.start(OWNER, &app.id).await.unwrap();
    assert!(info.pid.is_some());
    restarted.shutdown().await;
}
