// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-device-class lifecycle: serve the plugin socket, register it, tear it
//! down again.

use crate::PluginPaths;
use crate::device::{DeviceClass, HealthSource};
use crate::endpoint::{Endpoint, remove_socket};
use crate::error::{PluginError, Result};
use crate::registration::Registrar;
use crate::service::DevicePluginService;
use crate::state::PluginState;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Something the coordinator can start and stop as a unit.
#[async_trait]
pub trait Lifecycle: Send {
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<()>;

    /// Must succeed on an instance that was never started, and when called
    /// repeatedly.
    async fn stop(&mut self) -> Result<()>;
}

/// `PluginState` with the running endpoint attached where one exists.
enum Phase {
    Stopped,
    Starting,
    Serving(Endpoint),
    Registered(Endpoint),
    Stopping,
}

impl Phase {
    fn state(&self) -> PluginState {
        match self {
            Phase::Stopped => PluginState::Stopped,
            Phase::Starting => PluginState::Starting,
            Phase::Serving(_) => PluginState::Serving,
            Phase::Registered(_) => PluginState::Registered,
            Phase::Stopping => PluginState::Stopping,
        }
    }

    /// Move the phase out, leaving `Stopped` behind.
    fn take(&mut self) -> Phase {
        std::mem::replace(self, Phase::Stopped)
    }

    fn into_endpoint(self) -> Option<Endpoint> {
        match self {
            Phase::Serving(endpoint) | Phase::Registered(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

/// Device plugin for one [`DeviceClass`].
pub struct Plugin {
    class: Arc<DeviceClass>,
    health: Arc<dyn HealthSource>,
    socket_path: PathBuf,
    registrar: Registrar,
    phase: Phase,
    span: Span,
}

impl Plugin {
    pub fn new(class: DeviceClass, health: Arc<dyn HealthSource>, paths: &PluginPaths) -> Self {
        let span = info_span!(
            "device_plugin",
            plugin = %class.name,
            resource = %class.resource_name,
        );
        Self {
            socket_path: paths.plugin_dir.join(&class.socket_name),
            registrar: Registrar::new(&paths.kubelet_socket),
            class: Arc::new(class),
            health,
            phase: Phase::Stopped,
            span,
        }
    }

    pub fn class(&self) -> &DeviceClass {
        &self.class
    }

    pub fn state(&self) -> PluginState {
        self.phase.state()
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    fn check_transition(&self, to: PluginState) -> Result<()> {
        let from = self.phase.state();
        if !from.can_transition_to(to) {
            return Err(PluginError::InvalidTransition { from, to });
        }
        self.span.in_scope(|| debug!(%from, %to, "state transition"));
        Ok(())
    }

    /// Enter `next`, handing back the endpoint owned by the phase being left.
    fn enter(&mut self, next: Phase) -> Result<Option<Endpoint>> {
        self.check_transition(next.state())?;
        Ok(std::mem::replace(&mut self.phase, next).into_endpoint())
    }

    /// `Serving` -> `Registered`, keeping the endpoint.
    fn mark_registered(&mut self) -> Result<()> {
        self.check_transition(PluginState::Registered)?;
        if let Phase::Serving(endpoint) = self.phase.take() {
            self.phase = Phase::Registered(endpoint);
        }
        Ok(())
    }

    async fn bring_up(&self) -> Result<Endpoint> {
        let stop = CancellationToken::new();
        let service = DevicePluginService::new(
            Arc::clone(&self.class),
            Arc::clone(&self.health),
            stop.clone(),
            self.span.clone(),
        );
        Endpoint::bring_up(self.socket_path.clone(), service, stop, self.span.clone()).await
    }
}

#[async_trait]
impl Lifecycle for Plugin {
    fn name(&self) -> &str {
        &self.class.name
    }

    /// Serve the plugin socket and register it with the kubelet.
    ///
    /// If registration fails the endpoint keeps running and the plugin stays
    /// `Serving`; [`Lifecycle::stop`] tears it down.
    async fn start(&mut self) -> Result<()> {
        let current = self.state();
        if current != PluginState::Stopped {
            return Err(PluginError::AlreadyStarted(current));
        }

        self.enter(Phase::Starting)?;
        self.span.in_scope(|| info!("starting device plugin"));

        let endpoint = match self.bring_up().await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                self.enter(Phase::Stopped)?;
                return Err(err);
            }
        };
        self.enter(Phase::Serving(endpoint))?;

        self.registrar
            .register(&self.class.socket_name, &self.class.resource_name)
            .instrument(self.span.clone())
            .await?;
        self.mark_registered()?;

        self.span
            .in_scope(|| info!(socket = %self.socket_path.display(), "registered device plugin with kubelet"));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        match self.state() {
            PluginState::Stopped => {
                self.span.in_scope(|| debug!("device plugin already stopped"));
                return Ok(());
            }
            PluginState::Starting | PluginState::Stopping => {
                // A start or stop was dropped midway. Its endpoint is gone and
                // has cancelled its server; only the socket file may be left.
                self.span
                    .in_scope(|| warn!(state = %self.state(), "device plugin interrupted mid-transition, cleaning up"));
                self.enter(Phase::Stopped)?;
                return remove_socket(&self.socket_path);
            }
            PluginState::Serving | PluginState::Registered => {}
        }

        let endpoint = self.enter(Phase::Stopping)?;
        self.span.in_scope(|| info!("stopping device plugin"));

        let result = match endpoint {
            Some(endpoint) => endpoint.halt().instrument(self.span.clone()).await,
            None => Ok(()),
        };
        self.enter(Phase::Stopped)?;
        result
    }
}
