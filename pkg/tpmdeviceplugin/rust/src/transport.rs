// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

/// Unix-socket channels still need a syntactically valid URI; it is never dialed.
const PLACEHOLDER_URI: &str = "http://[::]:50051";

/// Open a gRPC channel over the unix socket at `socket_path`.
///
/// The connection is established eagerly and must complete within
/// `connect_timeout`.
pub async fn connect_unix(
    socket_path: &Path,
    connect_timeout: Duration,
) -> Result<Channel, tonic::transport::Error> {
    let socket_path: PathBuf = socket_path.to_path_buf();
    Endpoint::from_static(PLACEHOLDER_URI)
        .connect_timeout(connect_timeout)
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket_path = socket_path.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(socket_path).await?)) }
        }))
        .await
}
