// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};
use tpm_device_plugin::events::{Event, Events};
use tpm_device_plugin::proto::device_plugin_client::DevicePluginClient;
use tpm_device_plugin::proto::registration_server::{Registration, RegistrationServer};
use tpm_device_plugin::proto::{Empty, ListAndWatchResponse, RegisterRequest};
use tpm_device_plugin::transport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Requests = Arc<Mutex<Vec<RegisterRequest>>>;

struct RecordingRegistration {
    requests: Requests,
}

#[tonic::async_trait]
impl Registration for RecordingRegistration {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.requests.lock().unwrap().push(request.into_inner());
        Ok(Response::new(Empty {}))
    }
}

/// In-process stand-in for the kubelet's `Registration` service.
pub struct FakeKubelet {
    socket: PathBuf,
    requests: Requests,
    server: Option<(CancellationToken, JoinHandle<()>)>,
}

impl FakeKubelet {
    pub fn start(socket: &Path) -> Self {
        let mut kubelet = Self {
            socket: socket.to_path_buf(),
            requests: Requests::default(),
            server: None,
        };
        kubelet.serve();
        kubelet
    }

    fn serve(&mut self) {
        let listener = UnixListener::bind(&self.socket).expect("failed to bind fake kubelet socket");
        let stop = CancellationToken::new();
        let service = RegistrationServer::new(RecordingRegistration {
            requests: Arc::clone(&self.requests),
        });
        let shutdown = stop.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                .await
                .expect("fake kubelet server failed");
        });
        self.server = Some((stop, task));
    }

    /// Shut the server down and remove its socket, like a kubelet going away.
    pub async fn stop(&mut self) {
        if let Some((stop, task)) = self.server.take() {
            stop.cancel();
            let _ = tokio::time::timeout(DEFAULT_TIMEOUT, task).await;
        }
        let _ = std::fs::remove_file(&self.socket);
    }

    /// Stop, then re-create the socket and serve again.
    pub async fn restart(&mut self) {
        self.stop().await;
        self.serve();
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn requests(&self) -> Vec<RegisterRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Poll until at least `n` registrations were received, or timeout.
    pub async fn wait_for_requests(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.requests.lock().unwrap().len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Events from either source, whichever comes first.
pub struct Merged<A, B>(pub A, pub B);

#[async_trait]
impl<A: Events, B: Events> Events for Merged<A, B> {
    async fn next(&mut self) -> Option<Event> {
        tokio::select! {
            event = self.0.next() => event,
            event = self.1.next() => event,
        }
    }
}

pub async fn device_plugin_client(socket: &Path) -> DevicePluginClient<Channel> {
    let channel = transport::connect_unix(socket, DEFAULT_TIMEOUT)
        .await
        .expect("failed to connect to plugin socket");
    DevicePluginClient::new(channel)
}

/// First message of a `ListAndWatch` stream on `socket`.
pub async fn list_devices(socket: &Path) -> ListAndWatchResponse {
    let mut client = device_plugin_client(socket).await;
    let mut stream = client
        .list_and_watch(Empty {})
        .await
        .expect("ListAndWatch failed")
        .into_inner();
    tokio::time::timeout(DEFAULT_TIMEOUT, stream.next())
        .await
        .expect("no ListAndWatch message within timeout")
        .expect("ListAndWatch stream ended early")
        .expect("ListAndWatch stream errored")
}
