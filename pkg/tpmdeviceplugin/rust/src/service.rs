// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `v1beta1.DevicePlugin` implementation for a single device class.

use crate::device::{DeviceClass, HealthSource};
use crate::error::PluginError;
use crate::proto::device_plugin_server::DevicePlugin;
use crate::proto::{
    AllocateRequest, AllocateResponse, DevicePluginOptions, Empty, ListAndWatchResponse,
    PreStartContainerRequest, PreStartContainerResponse, PreferredAllocationRequest,
    PreferredAllocationResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{Instrument, Span, debug};

/// Options this plugin registers with and reports back to the kubelet.
pub fn plugin_options() -> DevicePluginOptions {
    DevicePluginOptions {
        pre_start_required: false,
        get_preferred_allocation_available: false,
    }
}

/// gRPC service answering the kubelet for one device class.
///
/// `stop` is the owning plugin instance's stop signal: open `ListAndWatch`
/// streams end when it fires.
pub struct DevicePluginService {
    class: Arc<DeviceClass>,
    health: Arc<dyn HealthSource>,
    stop: CancellationToken,
    span: Span,
}

impl DevicePluginService {
    pub fn new(
        class: Arc<DeviceClass>,
        health: Arc<dyn HealthSource>,
        stop: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            class,
            health,
            stop,
            span,
        }
    }

    fn device_list(&self) -> ListAndWatchResponse {
        ListAndWatchResponse {
            devices: self
                .class
                .devices(self.health.as_ref())
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    type ListAndWatchStream = ReceiverStream<Result<ListAndWatchResponse, Status>>;

    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(plugin_options()))
    }

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        let devices = self.device_list();
        let stop = self.stop.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(
            async move {
                debug!(devices = devices.devices.len(), "ListAndWatch: sending device list");
                if tx.send(Ok(devices)).await.is_err() {
                    debug!("ListAndWatch: client went away before the device list was sent");
                    return;
                }
                // Health never changes yet; hold the stream open until the
                // plugin stops or the kubelet hangs up.
                tokio::select! {
                    _ = stop.cancelled() => debug!("ListAndWatch: plugin stopping, closing stream"),
                    _ = tx.closed() => debug!("ListAndWatch: client closed stream"),
                }
            }
            .instrument(self.span.clone()),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_preferred_allocation(
        &self,
        _request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        self.span
            .in_scope(|| debug!("GetPreferredAllocation() is unimplemented for this plugin"));
        Err(PluginError::Unimplemented("GetPreferredAllocation").into())
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        let container_responses = self.span.in_scope(|| {
            debug!(containers = request.container_requests.len(), "Allocate() call");
            request
                .container_requests
                .iter()
                .map(|creq| {
                    debug!(device_ids = ?creq.devices_ids, "allocate ContainerRequest");
                    self.class.policy.grant()
                })
                .collect()
        });

        Ok(Response::new(AllocateResponse {
            container_responses,
        }))
    }

    async fn pre_start_container(
        &self,
        _request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        self.span
            .in_scope(|| debug!("PreStartContainer() is a no-op for this plugin"));
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
