// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod helpers;

use helpers::{DEFAULT_TIMEOUT, FakeKubelet, Merged, device_plugin_client, list_devices};
use std::sync::Arc;
use tokio::sync::mpsc;
use tpm_device_plugin::PluginPaths;
use tpm_device_plugin::coordinator::Coordinator;
use tpm_device_plugin::device::{AllocationPolicy, AlwaysHealthy, DeviceClass, TCTI_ENV_VAR};
use tpm_device_plugin::events::{Event, KubeletSocketWatcher};
use tpm_device_plugin::plugin::{Lifecycle, Plugin};
use tpm_device_plugin::proto::{AllocateRequest, ContainerAllocateRequest};

fn class_a() -> DeviceClass {
    DeviceClass::new(
        "a",
        "example.com/a",
        "a.sock",
        (0..4).map(|i| format!("a-{i}")).collect(),
        AllocationPolicy::single_node("/dev/a", false),
    )
}

fn class_b() -> DeviceClass {
    DeviceClass::new(
        "b",
        "example.com/b",
        "b.sock",
        vec!["b-0".to_string()],
        AllocationPolicy::single_node("/dev/b", true),
    )
}

fn coordinator(paths: &PluginPaths) -> Coordinator {
    let plugins: Vec<Box<dyn Lifecycle>> = [class_a(), class_b()]
        .into_iter()
        .map(|class| Box::new(Plugin::new(class, Arc::new(AlwaysHealthy), paths)) as Box<dyn Lifecycle>)
        .collect();
    Coordinator::new(plugins)
}

#[tokio::test]
async fn test_register_restart_allocate_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let paths = PluginPaths::new(dir.path(), dir.path().join("kubelet.sock"));
    let socket_a = dir.path().join("a.sock");
    let socket_b = dir.path().join("b.sock");

    let mut kubelet = FakeKubelet::start(&paths.kubelet_socket);
    let watcher = KubeletSocketWatcher::new(kubelet.socket()).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    let mut coordinator = coordinator(&paths);
    coordinator.start_all().await.unwrap();

    let endpoints: Vec<String> = kubelet.requests().into_iter().map(|r| r.endpoint).collect();
    assert_eq!(endpoints, vec!["a.sock", "b.sock"]);

    let devices_a = list_devices(&socket_a).await.devices;
    assert_eq!(devices_a.len(), 4);
    assert!(devices_a.iter().all(|d| d.health == "Healthy"));
    let devices_b = list_devices(&socket_b).await.devices;
    assert_eq!(devices_b.len(), 1);
    assert_eq!(devices_b[0].id, "b-0");
    assert_eq!(devices_b[0].health, "Healthy");

    let run = tokio::spawn(async move {
        let mut events = Merged(watcher, rx);
        coordinator.run(&mut events).await
    });

    // Kubelet comes back: both plugins restart and register again.
    kubelet.restart().await;
    assert!(
        kubelet.wait_for_requests(4, DEFAULT_TIMEOUT).await,
        "plugins should re-register after kubelet restart, got {:?}",
        kubelet.requests()
    );
    let resources: Vec<String> = kubelet.requests()[2..]
        .iter()
        .map(|r| r.resource_name.clone())
        .collect();
    assert_eq!(resources, vec!["example.com/a", "example.com/b"]);
    assert_eq!(list_devices(&socket_a).await.devices.len(), 4);

    let mut client = device_plugin_client(&socket_b).await;
    let response = client
        .allocate(AllocateRequest {
            container_requests: (0..3)
                .map(|_| ContainerAllocateRequest {
                    devices_ids: vec!["b-0".to_string()],
                })
                .collect(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.container_responses.len(), 3);
    for grant in &response.container_responses {
        assert_eq!(grant.devices.len(), 1);
        assert_eq!(grant.devices[0].host_path, "/dev/b");
        assert_eq!(grant.devices[0].container_path, "/dev/b");
        assert_eq!(grant.devices[0].permissions, "rwm");
        assert_eq!(
            grant.envs.get(TCTI_ENV_VAR).map(String::as_str),
            Some("device:/dev/b")
        );
    }
    drop(client);

    tx.send(Event::Terminate("SIGTERM")).unwrap();
    let result = tokio::time::timeout(DEFAULT_TIMEOUT * 2, run)
        .await
        .expect("coordinator should stop after terminate")
        .unwrap();
    assert!(result.is_ok());
    assert!(!socket_a.exists());
    assert!(!socket_b.exists());
    assert_eq!(kubelet.requests().len(), 4);
}

#[tokio::test]
async fn test_startup_fails_without_kubelet() {
    let dir = tempfile::tempdir().unwrap();
    let paths = PluginPaths::new(dir.path(), dir.path().join("kubelet.sock"));

    let mut coordinator = coordinator(&paths);
    let err = coordinator.start_all().await.unwrap_err();
    assert!(format!("{err:#}").starts_with("a: device plugin failed to start on startup"));

    coordinator.stop_all().await;
    assert!(!dir.path().join("a.sock").exists());
    assert!(!dir.path().join("b.sock").exists());
}
