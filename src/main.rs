mod config;
mod delivery;
mod error;
mod models;
mod pipeline;

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;

use config::GatewayConfig;
use delivery::{BatchScheduler, HttpDeliveryClient};
use error::GatewayError;
use models::AdaptorMessage;
use pipeline::Dispatcher;

async fn main_loop(config: GatewayConfig) -> Result<(), GatewayError> {
    info!("Starting sensor event gateway");

    let delivery = Arc::new(HttpDeliveryClient::new(&config)?);
    let window = Duration::from_secs_f64(config.send_delay_secs);
    let scheduler = BatchScheduler::new(window, delivery);
    let mut dispatcher = Dispatcher::new(config, scheduler);

    // The adaptor registry feeds newline-delimited JSON messages on
    // stdin; capability responses go back as JSON lines on stdout.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Listening for adaptor messages on stdin");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AdaptorMessage>(&line) {
            Ok(AdaptorMessage::Reading(reading)) => {
                dispatcher.on_reading(reading).await;
            }
            Ok(AdaptorMessage::Services(announcement)) => {
                let response = dispatcher.on_capability_announcement(announcement);
                match serde_json::to_string(&response) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to encode capability response: {}", e),
                }
            }
            Ok(AdaptorMessage::Deregister { device_id }) => {
                dispatcher.deregister(&device_id);
            }
            Err(e) => {
                warn!("Discarding malformed adaptor message: {}", e);
            }
        }
    }

    info!("Adaptor stream closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
