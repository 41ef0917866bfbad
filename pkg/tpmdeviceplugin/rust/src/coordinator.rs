// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Drives every plugin through startup, kubelet restarts and shutdown.

use crate::events::{Event, Events};
use crate::plugin::Lifecycle;
use anyhow::{Context, Result};
use tracing::{error, info, warn};

pub struct Coordinator {
    plugins: Vec<Box<dyn Lifecycle>>,
}

impl Coordinator {
    pub fn new(plugins: Vec<Box<dyn Lifecycle>>) -> Self {
        Self { plugins }
    }

    /// Start every plugin in order. The first failure aborts startup.
    pub async fn start_all(&mut self) -> Result<()> {
        for plugin in self.plugins.iter_mut() {
            let name = plugin.name().to_string();
            plugin
                .start()
                .await
                .with_context(|| format!("{name}: device plugin failed to start on startup"))?;
        }
        Ok(())
    }

    /// React to `events` until a terminating one arrives or the source is
    /// exhausted. Every plugin is stopped before this returns, and a plugin
    /// that fails to stop makes the shutdown fail.
    ///
    /// A failed restart is fatal: plugins are stopped on a best-effort basis
    /// and the error is returned.
    pub async fn run(&mut self, events: &mut impl Events) -> Result<()> {
        loop {
            let Some(event) = events.next().await else {
                info!("event source closed, shutting down");
                return self.stop_all_checked().await;
            };

            match event {
                Event::KubeletRestarted | Event::Reload => {
                    info!(?event, "restarting device plugins");
                    if let Err(err) = self.restart().await {
                        error!(error = %format!("{err:#}"), "restarting device plugins failed, shutting down");
                        self.stop_all().await;
                        return Err(err);
                    }
                }
                Event::Terminate(signal) => {
                    info!(signal, "shutting down");
                    return self.stop_all_checked().await;
                }
                Event::WatchError(err) => {
                    warn!(error = %err, "inotify error");
                }
            }
        }
    }

    /// Stop all, then start all. Never interleaved.
    async fn restart(&mut self) -> Result<()> {
        for plugin in self.plugins.iter_mut() {
            let name = plugin.name().to_string();
            plugin
                .stop()
                .await
                .with_context(|| format!("{name}: failed to stop device plugin on restart"))?;
        }
        for plugin in self.plugins.iter_mut() {
            let name = plugin.name().to_string();
            plugin
                .start()
                .await
                .with_context(|| format!("{name}: failed to start device plugin on restart"))?;
        }
        Ok(())
    }

    /// Stop every plugin, even after one fails, and return the first failure.
    pub async fn stop_all_checked(&mut self) -> Result<()> {
        let mut first_err = None;
        for plugin in self.plugins.iter_mut() {
            if let Err(err) = plugin.stop().await {
                let name = plugin.name().to_string();
                error!(plugin = %name, error = %err, "failed to stop device plugin on shutdown");
                if first_err.is_none() {
                    first_err = Some(
                        anyhow::Error::new(err)
                            .context(format!("{name}: failed to stop device plugin on shutdown")),
                    );
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop every plugin, logging failures rather than returning them.
    pub async fn stop_all(&mut self) {
        for plugin in self.plugins.iter_mut() {
            if let Err(err) = plugin.stop().await {
                error!(plugin = plugin.name(), error = %err, "failed to stop device plugin");
            }
        }
    }
}
