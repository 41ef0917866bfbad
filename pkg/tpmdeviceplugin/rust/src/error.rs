// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Errors raised while bringing a plugin up, registering it or tearing it down.

use crate::state::PluginState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    // Endpoint errors
    #[error("removing socket path {}: {source}", .path.display())]
    RemoveSocket {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("listening on unix socket {}: {source}", .path.display())]
    Listen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("gRPC server on {} did not start within timeout {timeout:?}: {reason}", .path.display())]
    ServerNotReady {
        path: PathBuf,
        timeout: Duration,
        reason: String,
    },

    // Registration errors
    #[error("connecting to kubelet socket at {}: {reason}", .path.display())]
    KubeletConnect { path: PathBuf, reason: String },

    #[error("gRPC register call: {0}")]
    Register(#[source] tonic::Status),

    #[error("gRPC register call did not complete within timeout {0:?}")]
    RegisterTimeout(Duration),

    // Protocol errors
    #[error("plugin does not implement this method: {0}")]
    Unimplemented(&'static str),

    // Lifecycle errors
    #[error("device plugin is already started ({0})")]
    AlreadyStarted(PluginState),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: PluginState, to: PluginState },
}

impl From<PluginError> for tonic::Status {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Unimplemented(_) => tonic::Status::unimplemented(err.to_string()),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
