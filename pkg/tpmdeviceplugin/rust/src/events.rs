// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Node events that drive the coordinator: kubelet restarts seen through the
//! filesystem, and process signals.

use anyhow::Context;
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The kubelet socket was created again.
    KubeletRestarted,
    /// SIGHUP.
    Reload,
    /// A terminating signal, by name.
    Terminate(&'static str),
    /// The filesystem watcher reported an error.
    WatchError(String),
}

/// A source of [`Event`]s. `None` means the source is exhausted.
#[async_trait]
pub trait Events: Send {
    async fn next(&mut self) -> Option<Event>;
}

#[async_trait]
impl Events for mpsc::UnboundedReceiver<Event> {
    async fn next(&mut self) -> Option<Event> {
        self.recv().await
    }
}

/// Watches the kubelet socket's directory for the socket being re-created.
///
/// The directory is watched rather than the socket itself, since the socket
/// does not exist while the kubelet is down.
pub struct KubeletSocketWatcher {
    socket_name: Option<std::ffi::OsString>,
    fs_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    _watcher: RecommendedWatcher,
}

impl KubeletSocketWatcher {
    pub fn new(kubelet_socket: &Path) -> anyhow::Result<Self> {
        let dir = kubelet_socket
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let (fs_tx, fs_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(res);
        })
        .context("creating filesystem watcher")?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {}", dir.display()))?;

        Ok(Self {
            socket_name: kubelet_socket.file_name().map(ToOwned::to_owned),
            fs_rx,
            _watcher: watcher,
        })
    }

    fn is_socket(&self, path: &Path) -> bool {
        self.socket_name.is_some() && path.file_name() == self.socket_name.as_deref()
    }
}

#[async_trait]
impl Events for KubeletSocketWatcher {
    async fn next(&mut self) -> Option<Event> {
        loop {
            match self.fs_rx.recv().await? {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "fs event");
                    if matches!(event.kind, EventKind::Create(_))
                        && event.paths.iter().any(|p| self.is_socket(p))
                    {
                        info!("inotify: kubelet socket created, kubelet restarted");
                        return Some(Event::KubeletRestarted);
                    }
                }
                Err(err) => return Some(Event::WatchError(err.to_string())),
            }
        }
    }
}

/// SIGHUP, SIGINT, SIGTERM and SIGQUIT.
pub struct Signals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Signals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    pub async fn recv(&mut self) -> Option<Event> {
        let event = tokio::select! {
            r = self.hangup.recv() => r.map(|()| Event::Reload),
            r = self.interrupt.recv() => r.map(|()| Event::Terminate("SIGINT")),
            r = self.terminate.recv() => r.map(|()| Event::Terminate("SIGTERM")),
            r = self.quit.recv() => r.map(|()| Event::Terminate("SIGQUIT")),
        };
        if let Some(event) = &event {
            info!(?event, "received signal");
        }
        event
    }
}

/// Everything the running daemon reacts to.
pub struct NodeEvents {
    kubelet: KubeletSocketWatcher,
    signals: Signals,
}

impl NodeEvents {
    pub fn new(kubelet_socket: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            kubelet: KubeletSocketWatcher::new(kubelet_socket)?,
            signals: Signals::new().context("installing signal handlers")?,
        })
    }
}

#[async_trait]
impl Events for NodeEvents {
    async fn next(&mut self) -> Option<Event> {
        tokio::select! {
            event = self.kubelet.next() => event,
            event = self.signals.recv() => event,
        }
    }
}
