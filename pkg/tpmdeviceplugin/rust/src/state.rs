// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// No endpoint, no socket.
    Stopped,
    /// Endpoint bring-up in progress.
    Starting,
    /// gRPC server bound and answering, not yet registered.
    Serving,
    /// Registered with the kubelet.
    Registered,
    /// Teardown in progress.
    Stopping,
}

impl PluginState {
    /// True while a server is bound to the plugin socket.
    pub fn is_active(self) -> bool {
        matches!(self, PluginState::Serving | PluginState::Registered)
    }

    pub(crate) fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Serving)
                | (Starting, Stopped)
                | (Serving, Registered)
                | (Serving, Stopping)
                | (Registered, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Stopped => write!(f, "stopped"),
            PluginState::Starting => write!(f, "starting"),
            PluginState::Serving => write!(f, "serving"),
            PluginState::Registered => write!(f, "registered"),
            PluginState::Stopping => write!(f, "stopping"),
        }
    }
}
