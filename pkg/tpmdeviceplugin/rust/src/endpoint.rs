// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Unix-socket gRPC endpoint serving one [`DevicePluginService`].

use crate::CONNECTION_TIMEOUT;
use crate::error::{PluginError, Result};
use crate::proto::Empty;
use crate::proto::device_plugin_client::DevicePluginClient;
use crate::proto::device_plugin_server::DevicePluginServer;
use crate::service::DevicePluginService;
use crate::transport;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep, timeout};
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::transport::Server;
use tracing::{Instrument, Span, debug, error, info, warn};

/// How long a halted server gets to drain before its task is aborted.
pub const HALT_TIMEOUT: Duration = Duration::from_secs(5);

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Delay between serve-loop restarts: doubles per attempt up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// Delay to wait now; the following one is doubled.
    pub(crate) fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// A server that stayed up longer than the cap starts over from the
    /// initial delay.
    pub(crate) fn reset_if_ran_longer_than(&mut self, ran: Duration) {
        if ran > self.max {
            self.current = self.initial;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

/// A running gRPC server bound to a plugin socket.
///
/// The serve task and its stop token only exist together; both are consumed
/// by [`Endpoint::halt`]. Dropping an endpoint without halting it still
/// cancels the server.
#[derive(Debug)]
pub struct Endpoint {
    socket_path: PathBuf,
    stop: DropGuard,
    server: JoinHandle<()>,
}

impl Endpoint {
    /// Bind `socket_path`, start serving `service` on it and wait until the
    /// server answers a `GetDevicePluginOptions` call.
    ///
    /// Cancelling `stop` shuts the server down; the same token is expected to
    /// be shared with `service` so open streams end with it.
    pub async fn bring_up(
        socket_path: PathBuf,
        service: DevicePluginService,
        stop: CancellationToken,
        span: Span,
    ) -> Result<Self> {
        let listener = bind(&socket_path)?;
        span.in_scope(|| info!(socket = %socket_path.display(), "gRPC server listening"));

        let server = tokio::spawn(
            serve_loop(
                socket_path.clone(),
                listener,
                DevicePluginServer::new(service),
                stop.clone(),
            )
            .instrument(span.clone()),
        );

        let endpoint = Self {
            socket_path,
            stop: stop.drop_guard(),
            server,
        };

        if let Err(reason) = check_ready(&endpoint.socket_path).await {
            let path = endpoint.socket_path.clone();
            if let Err(err) = endpoint.halt().await {
                span.in_scope(|| warn!(error = %err, "cleaning up endpoint after failed readiness check"));
            }
            return Err(PluginError::ServerNotReady {
                path,
                timeout: CONNECTION_TIMEOUT,
                reason,
            });
        }

        span.in_scope(|| debug!("gRPC server is ready"));
        Ok(endpoint)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop serving and remove the socket file.
    ///
    /// The server gets [`HALT_TIMEOUT`] to finish gracefully, after which its
    /// task is aborted.
    pub async fn halt(self) -> Result<()> {
        let Self {
            socket_path,
            stop,
            mut server,
        } = self;

        stop.disarm().cancel();
        match timeout(HALT_TIMEOUT, &mut server).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "gRPC server task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout = ?HALT_TIMEOUT,
                    "gRPC server did not stop gracefully, aborting"
                );
                server.abort();
                // The task must be gone before its socket is removed.
                let _ = server.await;
            }
        }

        remove_socket(&socket_path)
    }
}

/// Remove `path`; a missing file is not an error.
pub(crate) fn remove_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PluginError::RemoveSocket {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    remove_socket(socket_path)?;
    UnixListener::bind(socket_path).map_err(|source| PluginError::Listen {
        path: socket_path.to_path_buf(),
        source,
    })
}

/// Connect to our own socket and issue `GetDevicePluginOptions`, all within
/// [`CONNECTION_TIMEOUT`].
async fn check_ready(socket_path: &Path) -> std::result::Result<(), String> {
    let attempt = async {
        let channel = transport::connect_unix(socket_path, CONNECTION_TIMEOUT)
            .await
            .map_err(|err| format!("connect: {err}"))?;
        DevicePluginClient::new(channel)
            .get_device_plugin_options(Empty {})
            .await
            .map_err(|status| format!("GetDevicePluginOptions: {status}"))?;
        Ok(())
    };

    match timeout(CONNECTION_TIMEOUT, attempt).await {
        Ok(result) => result,
        Err(_) => Err("readiness check timed out".to_string()),
    }
}

/// Serve until `stop` fires. A server that exits on its own is restarted on
/// a freshly bound listener, with exponential backoff between attempts.
async fn serve_loop(
    socket_path: PathBuf,
    listener: UnixListener,
    service: DevicePluginServer<DevicePluginService>,
    stop: CancellationToken,
) {
    let mut listener = Some(listener);
    let mut backoff = Backoff::default();

    loop {
        if let Some(listener) = listener.take() {
            let started = Instant::now();
            let result = Server::builder()
                .add_service(service.clone())
                .serve_with_incoming_shutdown(
                    UnixListenerStream::new(listener),
                    stop.clone().cancelled_owned(),
                )
                .await;

            if stop.is_cancelled() {
                debug!("gRPC server stopped");
                return;
            }
            match result {
                Ok(()) => warn!("gRPC server exited unexpectedly, restarting"),
                Err(err) => error!(error = %err, "gRPC server crashed, restarting"),
            }
            backoff.reset_if_ran_longer_than(started.elapsed());
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = sleep(backoff.next()) => {}
        }

        match bind(&socket_path) {
            Ok(rebound) => listener = Some(rebound),
            Err(err) => error!(error = %err, "rebinding gRPC server socket"),
        }
    }
}
