// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::device::{DEFAULT_TPMRM_DEVICES, DeviceClass};
use crate::logging::{LogConfig, LogFormat, LogLevel};
use clap::Parser;

const DESCRIPTION: &str = "\
This is a Kubernetes TPM device plugin. It passes the host TPM devices through
to pods without requiring them to run privileged.

Two devices are of interest:
- /dev/tpmrm0
- /dev/tpm0

/dev/tpmrm0 goes through the in-kernel resource manager and can be used by
many processes at once, so there is no real limit on how many pods can get it.
The scheduler still needs device IDs to count, so a fixed number of IDs is
advertised for it (see --num-tpmrm-devices).

/dev/tpm0 can only be used by a single process. Request it only on kernels
older than 4.12, and make sure nothing on the host (e.g. tpm2-abrmd) uses it.

Request ONE of the following resources in a pod's limits, preferably the
first one:
- githedgehog.com/tpmrm: 1
- githedgehog.com/tpm: 1";

/// Kubernetes TPM device plugin
#[derive(Parser, Debug, Clone)]
#[command(name = "k8s-tpm-device-plugin", version)]
#[command(about = "Kubernetes TPM device plugin", long_about = DESCRIPTION)]
pub struct Args {
    /// Minimum log level to log at
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format to use
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Enables development log settings
    #[arg(long, env = "LOG_DEVELOPMENT")]
    pub log_development: bool,

    /// Number of artificial /dev/tpmrm0 devices to advertise to the kubelet
    #[arg(
        long,
        env = "NUM_TPMRM_DEVICES",
        default_value_t = DEFAULT_TPMRM_DEVICES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub num_tpmrm_devices: u32,

    /// Pass a TPM2TOOLS_TCTI environment variable pointing at the device to
    /// every pod the device is allocated to
    #[arg(long, env = "PASS_TPM2TOOLS_TCTI_ENV_VAR")]
    pub pass_tpm2tools_tcti_env_var: bool,
}

impl Args {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            format: self.log_format,
            development: self.log_development,
        }
    }

    /// Device classes to serve, in startup order.
    pub fn device_classes(&self) -> Vec<DeviceClass> {
        let inject = self.pass_tpm2tools_tcti_env_var;
        vec![
            DeviceClass::tpmrm(self.num_tpmrm_devices, inject),
            DeviceClass::tpm(inject),
        ]
    }
}
