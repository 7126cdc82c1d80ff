use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::membership::{InstanceId, TargetGroupSet};

/// Value of `INSTANCEID` that asks for the id to be read from instance metadata.
pub const INSTANCE_ID_FROM_METADATA: &str = "metadata";

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "INSTANCEID", default = "metadata")]
    pub instance_id: String,

    #[envconfig(from = "TARGETGROUPIDS")]
    pub target_group_ids: String,

    #[envconfig(from = "MONITORSPOT", default = "false")]
    pub monitor_spot: FlexBool,

    #[envconfig(
        from = "SPOT_TERMINATION_URL",
        default = "http://169.254.169.254/latest/meta-data/spot/termination-time"
    )]
    pub spot_termination_url: String,

    #[envconfig(from = "SPOT_POLL_INTERVAL_MS", default = "5000")]
    pub spot_poll_interval: EnvMsDuration,

    #[envconfig(from = "METADATA_REQUEST_TIMEOUT_MS", default = "2000")]
    pub metadata_request_timeout: EnvMsDuration,

    #[envconfig(from = "LOG_FORMAT_JSON", default = "false")]
    pub log_format_json: FlexBool,
}

impl Config {
    /// Validate the raw environment values into the settings the registrar runs with.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let target_groups = TargetGroupSet::from_str(&self.target_group_ids)?;

        let instance = match self.instance_id.trim() {
            INSTANCE_ID_FROM_METADATA => InstanceSource::Metadata,
            "" => return Err(ConfigError::EmptyInstanceId),
            literal => InstanceSource::Literal(InstanceId::new(literal)),
        };

        let preemption = if *self.monitor_spot {
            if self.spot_poll_interval.0.is_zero() {
                return Err(ConfigError::ZeroPollInterval);
            }
            Some(PreemptionSettings {
                poll_interval: self.spot_poll_interval.0,
            })
        } else {
            None
        };

        Ok(Settings {
            instance,
            target_groups,
            preemption,
        })
    }
}

/// Where the instance id comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSource {
    Literal(InstanceId),
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreemptionSettings {
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub instance: InstanceSource,
    pub target_groups: TargetGroupSet,
    /// `None` when spot termination monitoring is disabled.
    pub preemption: Option<PreemptionSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}
