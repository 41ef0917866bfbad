// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Kubernetes device plugin exposing the host TPM to unprivileged pods.
//!
//! One [`plugin::Plugin`] runs per [`device::DeviceClass`]: it serves the
//! kubelet's `v1beta1.DevicePlugin` API on a unix socket and registers that
//! socket with the kubelet. The [`coordinator::Coordinator`] restarts every
//! plugin when the kubelet comes back and stops them on shutdown.

pub mod config;
pub mod coordinator;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod logging;
pub mod plugin;
pub mod registration;
pub mod service;
pub mod state;
pub mod transport;

pub mod proto {
    tonic::include_proto!("v1beta1");
}

use std::path::PathBuf;
use std::time::Duration;

/// Directory the kubelet expects device plugin sockets in.
pub const DEVICE_PLUGIN_PATH: &str = "/var/lib/kubelet/device-plugins/";

/// Socket the kubelet serves the `Registration` service on.
pub const KUBELET_SOCKET: &str = "/var/lib/kubelet/device-plugins/kubelet.sock";

/// Device plugin API version this plugin implements.
pub const API_VERSION: &str = "v1beta1";

/// Upper bound for establishing a unix-socket gRPC connection, used both for
/// probing our own endpoint and for dialing the kubelet.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for the kubelet to answer a `Register` call.
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Filesystem locations shared by every plugin instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPaths {
    /// Directory plugin sockets are created in.
    pub plugin_dir: PathBuf,
    /// Kubelet registration socket.
    pub kubelet_socket: PathBuf,
}

impl PluginPaths {
    pub fn new(plugin_dir: impl Into<PathBuf>, kubelet_socket: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            kubelet_socket: kubelet_socket.into(),
        }
    }
}

impl Default for PluginPaths {
    fn default() -> Self {
        Self::new(DEVICE_PLUGIN_PATH, KUBELET_SOCKET)
    }
}
