use crate::app_config::AppConfig;
use crate::cli::Args;
use crate::domain::{FixTransition, VehicleError};
use crate::follow::FollowController;
use crate::gps::{GpsdSource, PositionSourceClient};
use clap::Parser;
use std::sync::Arc;
use tokio::task;
use tracing::{error, info, warn};

mod app_config;
mod cli;
mod domain;
mod follow;
mod geo_point_deserializer;
mod gps;
mod observer_hub;
mod status;
mod vehicle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level()).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("💥 Unable to load configuration: {}", e);
            return Err(e.into());
        }
    };
    info!("✅  Loaded configuration");

    let gps_config = gps::Config::new(config.gpsd(), config.follow().min_satellites(), config.follow().smoothing_window());
    let gps = Arc::new(PositionSourceClient::new(Box::new(GpsdSource::new(config.gpsd().address())), gps_config));
    gps.observers().subscribe(|transition: &FixTransition| {
        if transition.acquired() {
            info!("📡 GPS fix acquired ({} -> {})", transition.previous, transition.current);
        } else if transition.lost() {
            warn!("📡 GPS fix lost ({} -> {})", transition.previous, transition.current);
        } else {
            info!("📡 GPS fix changed ({} -> {})", transition.previous, transition.current);
        }
    });

    let gps_task = {
        let gps = gps.clone();
        task::spawn(async move { gps.run().await })
    };
    info!("✅  Initialized GPS client for {}", config.gpsd().address());

    let vehicle = vehicle::connect(config.vehicle().connection(), config.vehicle().home());
    let controller = Arc::new(FollowController::new(vehicle, gps.clone(), config.follow().clone()));

    let listener = status::bind(config.http().port()).await?;
    let status_rx = controller.status();
    task::spawn(async move {
        if let Err(e) = status::serve(listener, status_rx).await {
            error!("💥 Status server stopped: {}", e);
        }
    });
    info!("✅  Initialized status server");

    let follow = async {
        controller.prepare().await;
        if args.no_takeoff {
            info!("🛫 Skipping takeoff");
        } else {
            controller.takeoff().await?;
        }
        info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));
        controller.start_following().await;
        Ok::<(), VehicleError>(())
    };

    let result = tokio::select! {
        result = follow => result,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupted while {}, shutting down", controller.state());
            Ok(())
        }
    };

    controller.cancel();
    gps.cancel();
    gps.observers().clear_all();
    if let Err(e) = gps_task.await {
        warn!("⚠️ GPS client did not stop cleanly: {}", e);
    }

    if let Err(e) = result {
        error!("💥 Takeoff failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
