// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Device classes advertised to the kubelet and the devices they contain.

use crate::proto;
use std::collections::HashMap;
use std::fmt;

/// Resource name prefix shared by every device class.
pub const RESOURCE_VENDOR: &str = "githedgehog.com";

/// Environment variable tpm2-tools reads to find its TCTI.
pub const TCTI_ENV_VAR: &str = "TPM2TOOLS_TCTI";

/// Default number of IDs advertised for the shared `/dev/tpmrm0` device.
pub const DEFAULT_TPMRM_DEVICES: u32 = 64;

/// Cgroup permissions granted for every device node: read, write, mknod.
pub const DEFAULT_PERMISSIONS: &str = "rwm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl Health {
    /// Value the kubelet expects in `Device.health`.
    pub fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "Healthy",
            Health::Unhealthy => "Unhealthy",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub health: Health,
}

impl From<Device> for proto::Device {
    fn from(device: Device) -> Self {
        proto::Device {
            id: device.id,
            health: device.health.as_str().to_string(),
            topology: None,
        }
    }
}

/// Reports the health of individual devices of a class.
pub trait HealthSource: Send + Sync {
    fn health(&self, class: &DeviceClass, device_id: &str) -> Health;
}

/// Nothing inspects the TPM yet, so every device is reported healthy.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHealthy;

impl HealthSource for AlwaysHealthy {
    fn health(&self, _class: &DeviceClass, _device_id: &str) -> Health {
        Health::Healthy
    }
}

/// What a container receives when one of the class's devices is allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPolicy {
    /// Device nodes bind-mounted at the same path inside the container.
    pub device_nodes: Vec<String>,
    pub permissions: String,
    /// Injected into the container; empty when injection is disabled.
    pub envs: HashMap<String, String>,
}

impl AllocationPolicy {
    /// Grants `node` with `rwm`, optionally pointing tpm2-tools at it.
    pub fn single_node(node: &str, inject_tcti: bool) -> Self {
        let mut envs = HashMap::new();
        if inject_tcti {
            envs.insert(TCTI_ENV_VAR.to_string(), format!("device:{node}"));
        }
        Self {
            device_nodes: vec![node.to_string()],
            permissions: DEFAULT_PERMISSIONS.to_string(),
            envs,
        }
    }

    pub fn grant(&self) -> proto::ContainerAllocateResponse {
        proto::ContainerAllocateResponse {
            envs: self.envs.clone(),
            devices: self
                .device_nodes
                .iter()
                .map(|node| proto::DeviceSpec {
                    container_path: node.clone(),
                    host_path: node.clone(),
                    permissions: self.permissions.clone(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// A category of hardware resource advertised under one resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClass {
    /// Short name used in logs, e.g. `tpmrm`.
    pub name: String,
    /// Resource name pods request, e.g. `githedgehog.com/tpmrm`.
    pub resource_name: String,
    /// File name of the plugin socket inside the plugin directory.
    pub socket_name: String,
    pub device_ids: Vec<String>,
    pub policy: AllocationPolicy,
}

impl DeviceClass {
    pub fn new(
        name: impl Into<String>,
        resource_name: impl Into<String>,
        socket_name: impl Into<String>,
        device_ids: Vec<String>,
        policy: AllocationPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            resource_name: resource_name.into(),
            socket_name: socket_name.into(),
            device_ids,
            policy,
        }
    }

    /// `/dev/tpmrm0`: the in-kernel resource manager allows any number of
    /// concurrent users, so `count` artificial IDs are advertised for it.
    pub fn tpmrm(count: u32, inject_tcti: bool) -> Self {
        let device_ids = (0..count).map(|i| format!("tpmrm0-{i}")).collect();
        Self::new(
            "tpmrm",
            format!("{RESOURCE_VENDOR}/tpmrm"),
            "hh-tpmrm.sock",
            device_ids,
            AllocationPolicy::single_node("/dev/tpmrm0", inject_tcti),
        )
    }

    /// `/dev/tpm0`: raw access, usable by a single process at a time.
    pub fn tpm(inject_tcti: bool) -> Self {
        Self::new(
            "tpm",
            format!("{RESOURCE_VENDOR}/tpm"),
            "hh-tpm.sock",
            vec!["tpm0".to_string()],
            AllocationPolicy::single_node("/dev/tpm0", inject_tcti),
        )
    }

    pub fn devices(&self, health: &dyn HealthSource) -> Vec<Device> {
        self.device_ids
            .iter()
            .map(|id| Device {
                id: id.clone(),
                health: health.health(self, id),
            })
            .collect()
    }
}
