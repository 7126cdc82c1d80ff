use std::error::Error as _;
use std::process::ExitCode;

use aws_config::{imds, BehaviorVersion};
use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use tg_registrar::config::Config;
use tg_registrar::control_plane::ElbClient;
use tg_registrar::error::{ConfigError, RegistrarError};
use tg_registrar::metadata::{Ec2Metadata, NoticeProbe};
use tg_registrar::{Outcome, Registrar};

fn setup_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_layer = if json {
        fmt::layer().json().with_filter(filter).boxed()
    } else {
        fmt::layer().with_target(true).with_filter(filter).boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}

async fn run(config: Config) -> Result<Outcome, RegistrarError> {
    let settings = config.settings()?;

    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = ElbClient::new(aws_sdk_elasticloadbalancingv2::Client::new(&aws));

    let notice_probe = NoticeProbe::new(
        config.spot_termination_url.clone(),
        config.metadata_request_timeout.0,
    )
    .map_err(RegistrarError::MetadataClient)?;
    let metadata = Ec2Metadata::new(imds::Client::builder().build(), notice_probe);

    Registrar::new(settings, client, metadata).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(false);
            error!(error = %ConfigError::Env(e), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    setup_tracing(*config.log_format_json);

    match run(config).await {
        Ok(outcome) => {
            info!(success = outcome.is_success(), "tg-registrar exiting");
            outcome.exit_code()
        }
        Err(e) => {
            error!(error = %e, source = ?e.source(), "tg-registrar failed to start");
            ExitCode::FAILURE
        }
    }
}
