use std::fmt::{Debug, Display};

use tokio::task::JoinError;

use crate::{config::Config, controller::Controller};

mod aggregator;
mod config;
mod controller;
mod decision;
mod error;
mod gate;
mod mode;
pub mod models;
mod mqtt;
mod ports;
mod psychro;
mod relay;
mod state;
mod status;
mod telemetry;

const CONFIG_ENV: &str = "BOOST_HUB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/boost-hub.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, issues) = Config::load(&config_path)?;

    let subscriber = telemetry::create_subscriber(
        "humidity_boost_hub".to_string(),
        *config.log_level(),
        std::io::stdout,
    );
    telemetry::init_subscriber(subscriber);

    tracing::info!(config = %config_path, "Starting hub");
    for issue in &issues {
        tracing::warn!(error = %issue, "Configuration value replaced");
    }
    if !config.presence_sensors().is_empty() {
        tracing::debug!(
            presence_sensors = ?config.presence_sensors(),
            "Presence sensors are not used by the control logic"
        );
    }

    let (bridge, listener, commands) = mqtt::connect(&config);
    let controller = Controller::new(config, bridge.clone(), bridge.clone(), bridge);

    let listener_task = tokio::spawn(listener.run_until_completion());
    let controller_task = tokio::spawn(controller.run_until_completion(commands));
    let signal_task = tokio::signal::ctrl_c();

    tokio::select! {
        result = listener_task => report_exit("mqtt listener", result),
        result = controller_task => report_exit("controller", result),
        result = signal_task => report_exit("closed by user", Ok(result)),
    };

    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{} has exited", task_name),
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} failed",
                task_name
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{}' task failed to complete",
                task_name
            )
        }
    }
}
