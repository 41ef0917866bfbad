// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{PluginError, Result};
use crate::proto::RegisterRequest;
use crate::proto::registration_client::RegistrationClient;
use crate::service::plugin_options;
use crate::{API_VERSION, CONNECTION_TIMEOUT, REGISTER_TIMEOUT, transport};
use std::path::{Path, PathBuf};
use tokio::time::timeout;
use tracing::debug;

/// Submits plugin registrations to the kubelet's `Registration` service.
#[derive(Debug, Clone)]
pub struct Registrar {
    kubelet_socket: PathBuf,
}

impl Registrar {
    pub fn new(kubelet_socket: impl Into<PathBuf>) -> Self {
        Self {
            kubelet_socket: kubelet_socket.into(),
        }
    }

    pub fn kubelet_socket(&self) -> &Path {
        &self.kubelet_socket
    }

    /// Register the plugin serving on `endpoint` (a socket file name relative
    /// to the plugin directory) for `resource_name`. Not retried.
    pub async fn register(&self, endpoint: &str, resource_name: &str) -> Result<()> {
        let channel = transport::connect_unix(&self.kubelet_socket, CONNECTION_TIMEOUT)
            .await
            .map_err(|err| PluginError::KubeletConnect {
                path: self.kubelet_socket.clone(),
                reason: err.to_string(),
            })?;

        let request = registration_request(endpoint, resource_name);
        debug!(endpoint, resource_name, "registering with kubelet");

        let mut client = RegistrationClient::new(channel);
        timeout(REGISTER_TIMEOUT, client.register(request))
            .await
            .map_err(|_| PluginError::RegisterTimeout(REGISTER_TIMEOUT))?
            .map_err(PluginError::Register)?;
        Ok(())
    }
}

fn registration_request(endpoint: &str, resource_name: &str) -> RegisterRequest {
    RegisterRequest {
        version: API_VERSION.to_string(),
        endpoint: endpoint.to_string(),
        resource_name: resource_name.to_string(),
        options: Some(plugin_options()),
    }
}
