use dms_gateway::adapters::overlay::record::{Record, RecordClient};
use dms_gateway::adapters::{
    DeploymentManager, DeploymentOperator, FileRecordClient, Lifecycle, OverlayAdapter,
    OverlayConfig, PackageManager,
};
use dms_gateway::models::{DeploymentRequest, DeploymentUpdate, Filter, LogOptions, PackageUpload};
use dms_gateway::registry::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn adapter_at(root: &std::path::Path) -> OverlayAdapter {
    OverlayAdapter::new(
        "kustomize",
        OverlayConfig::default(),
        Arc::new(FileRecordClient::new(root)),
    )
}

async fn upload(adapter: &OverlayAdapter, name: &str, version: &str) -> String {
    adapter
        .upload_deployment_package(
            &CancellationToken::new(),
            &PackageUpload {
                name: name.to_string(),
                version: version.to_string(),
                package_type: "kustomize".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

fn request(name: &str, package_id: &str) -> DeploymentRequest {
    let mut extensions = HashMap::new();
    extensions.insert("overlayPath".to_string(), serde_json::json!("overlays/prod"));
    extensions.insert("replicas".to_string(), serde_json::json!(2));
    DeploymentRequest {
        name: name.to_string(),
        namespace: "core".to_string(),
        package_id: package_id.to_string(),
        description: "session management".to_string(),
        extensions,
    }
}

#[tokio::test]
async fn records_persist_across_adapter_instances() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let first = adapter_at(dir.path());
    let base = upload(&first, "smf", "1.0.0").await;
    let next = upload(&first, "smf", "1.1.0").await;
    let created = first
        .create_deployment(&cancel, &request("smf", &base))
        .await
        .unwrap();
    first
        .update_deployment(
            &cancel,
            "smf",
            &DeploymentUpdate {
                package_id: Some(next.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    first.close().await.unwrap();

    let record_file = dir.path().join("dms-system").join("dms-deployment-smf.json");
    assert!(record_file.exists());

    let second = adapter_at(dir.path());
    let loaded = second.get_deployment(&cancel, "smf").await.unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.package_id, next);
    assert_eq!(loaded.created_at, created.created_at);
    assert_eq!(loaded.extension_str("overlayPath"), Some("overlays/prod"));
    assert_eq!(loaded.extensions.get("replicas"), Some(&serde_json::json!(2)));

    let history = second.get_deployment_history(&cancel, "smf").await.unwrap();
    assert_eq!(history.revisions.len(), 1);
    assert_eq!(history.revisions[0].revision, 2);

    let logs = second
        .get_deployment_logs(&cancel, "smf", &LogOptions::default())
        .await
        .unwrap();
    let logs = String::from_utf8(logs).unwrap();
    assert!(logs.contains("created smf in core"));
    assert!(logs.contains("overlays/prod"));
}

#[tokio::test]
async fn hand_edited_record_is_read_defensively() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let adapter = adapter_at(dir.path());
    let package_id = upload(&adapter, "amf", "1.0.0").await;
    adapter
        .create_deployment(&cancel, &request("amf", &package_id))
        .await
        .unwrap();

    let client = FileRecordClient::new(dir.path());
    let mut record: Record = client
        .get("dms-system", "dms-deployment-amf")
        .await
        .unwrap()
        .unwrap();
    record.data.insert("version".to_string(), "".to_string());
    record.data.insert("status".to_string(), "Progressing".to_string());
    client.replace(&record).await.unwrap();

    let deployment = adapter.get_deployment(&cancel, "amf").await.unwrap();
    assert_eq!(deployment.version, 1);
    let status = adapter.get_deployment_status(&cancel, "amf").await.unwrap();
    assert_eq!(status.progress, 0);
    assert_eq!(status.conditions[0].reason, "Unknown");
}

#[tokio::test]
async fn unreadable_root_marks_adapter_unhealthy_in_registry() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let registry = Registry::default();
    registry
        .register(
            "kustomize",
            "overlay",
            Arc::new(adapter_at(&blocker)),
            HashMap::new(),
            true,
        )
        .await
        .unwrap();

    let metadata = registry.get_metadata("kustomize").await.unwrap();
    assert!(!metadata.healthy);
    assert!(metadata.health_error.is_some());

    // The failure is cached; later calls see it without retrying.
    let adapter = registry.get_default().await.unwrap();
    let err = adapter
        .list_deployments(&CancellationToken::new(), &Filter::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        dms_gateway::adapters::AdapterError::ConnectionFailed(_)
    ));
    registry.close().await.unwrap();
}
