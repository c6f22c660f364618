use crate::vehicle::ConnectionString;
use clap::{ArgAction, Parser};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "followme")]
#[command(about = "Keeps a drone at a fixed distance from a moving GPS receiver", version, long_about = None)]
pub struct Args {
    /// Port of the status web server
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Horizontal distance to keep from the target, in meters
    #[arg(long, short = 'd')]
    pub follow_distance: Option<f64>,

    /// Altitude to fly at, in meters relative to home
    #[arg(long, short = 'a')]
    pub follow_alt: Option<f64>,

    /// Vehicle link, e.g. udp:localhost:14550 or serial:/dev/ttyACM0:57600
    #[arg(long, short = 'c')]
    pub vehicle_connection: Option<ConnectionString>,

    /// Control loop period, e.g. 500ms
    #[arg(long)]
    pub loop_interval: Option<String>,

    /// Skip arming and takeoff, for a vehicle that is already flying
    #[arg(long, short = 'n')]
    pub no_takeoff: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Config file name, without extension
    #[arg(long, default_value = "config")]
    pub config: String,
}

impl Args {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
