// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process-wide `tracing` subscriber setup.

use clap::ValueEnum;
use std::fmt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Adds source locations, targets and thread ids to every line.
    pub development: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            development: false,
        }
    }
}

/// `RUST_LOG` takes precedence, falling back to the configured level.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let dev = config.development;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.level))
        .with_writer(std::io::stderr)
        .with_file(dev)
        .with_line_number(dev)
        .with_target(dev)
        .with_thread_ids(dev);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Console => builder.with_ansi(true).try_init(),
    };
    result.map_err(|err| anyhow::anyhow!("installing log subscriber: {err}"))
}
