use crate::cli::Args;
use crate::domain::GeoPoint;
use crate::vehicle::ConnectionString;
use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    follow: FollowerConfig,
    gpsd: Gpsd,
    vehicle: Vehicle,
    http: Http,
}

impl AppConfig {
    /// Layers the config file, an optional `config_local` file, `FOLLOWME_` environment
    /// variables and finally the command line flags.
    pub fn load(args: &Args) -> Result<Self, AppConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(config::File::with_name(&args.config).required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("FOLLOWME").separator("__"))
            .set_override_option("follow.follow_distance_m", args.follow_distance)?
            .set_override_option("follow.follow_altitude_m", args.follow_alt)?
            .set_override_option("follow.loop_interval", args.loop_interval.clone())?
            .set_override_option("vehicle.connection", args.vehicle_connection.as_ref().map(ToString::to_string))?
            .set_override_option("http.port", args.port.map(i64::from))?
            .build()?
            .try_deserialize()?;

        config.validate()
    }

    pub fn follow(&self) -> &FollowerConfig {
        &self.follow
    }

    pub fn gpsd(&self) -> &Gpsd {
        &self.gpsd
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn http(&self) -> &Http {
        &self.http
    }

    fn validate(self) -> Result<Self, AppConfigError> {
        let follow = &self.follow;
        if !(follow.follow_distance_m > 0.0) {
            return Err(AppConfigError::Invalid(format!("follow distance must be positive, got {}", follow.follow_distance_m)));
        }
        if !(follow.follow_altitude_m > 0.0) {
            return Err(AppConfigError::Invalid(format!("follow altitude must be positive, got {}", follow.follow_altitude_m)));
        }
        if !(follow.min_movement_delta_m >= 0.0) {
            return Err(AppConfigError::Invalid(format!(
                "minimum movement delta must not be negative, got {}",
                follow.min_movement_delta_m
            )));
        }
        if follow.loop_interval.is_zero() {
            return Err(AppConfigError::Invalid("loop interval must not be zero".to_string()));
        }
        if follow.poll_interval.is_zero() {
            return Err(AppConfigError::Invalid("poll interval must not be zero".to_string()));
        }
        if follow.smoothing_window == 0 {
            return Err(AppConfigError::Invalid("smoothing window must hold at least one sample".to_string()));
        }
        Ok(self)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FollowerConfig {
    follow_altitude_m: f64,
    follow_distance_m: f64,
    min_movement_delta_m: f64,
    #[serde(with = "humantime_serde")]
    loop_interval: Duration,
    #[serde(with = "humantime_serde")]
    poll_interval: Duration,
    min_satellites: usize,
    smoothing_window: usize,
}

impl FollowerConfig {
    pub fn follow_altitude(&self) -> f64 {
        self.follow_altitude_m
    }

    pub fn follow_distance(&self) -> f64 {
        self.follow_distance_m
    }

    pub fn min_movement_delta(&self) -> f64 {
        self.min_movement_delta_m
    }

    pub fn loop_interval(&self) -> Duration {
        self.loop_interval
    }

    /// Granularity of the readiness waits.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn min_satellites(&self) -> usize {
        self.min_satellites
    }

    pub fn smoothing_window(&self) -> usize {
        self.smoothing_window
    }
}

#[derive(Debug, Deserialize)]
pub struct Gpsd {
    address: String,
    #[serde(with = "humantime_serde")]
    retry_interval: Duration,
    #[serde(with = "humantime_serde")]
    stale_timeout: Duration,
}

impl Gpsd {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }
}

#[derive(Debug, Deserialize)]
pub struct Vehicle {
    connection: ConnectionString,
    home: GeoPoint,
}

impl Vehicle {
    pub fn connection(&self) -> &ConnectionString {
        &self.connection
    }

    /// Starting position of the simulated vehicle.
    pub fn home(&self) -> GeoPoint {
        self.home
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    port: u16,
}

impl Http {
    pub fn port(&self) -> u16 {
        self.port
    }
}

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                follow: FollowerConfig {
                    follow_altitude_m: 10.0,
                    follow_distance_m: 5.0,
                    min_movement_delta_m: 0.1,
                    loop_interval: Duration::from_millis(10),
                    poll_interval: Duration::from_millis(5),
                    min_satellites: 3,
                    smoothing_window: 5,
                },
                gpsd: Gpsd {
                    address: "127.0.0.1:2947".to_string(),
                    retry_interval: Duration::from_millis(10),
                    stale_timeout: Duration::from_secs(1),
                },
                vehicle: Vehicle {
                    connection: ConnectionString::Udp {
                        host: "localhost".to_string(),
                        port: 14550,
                    },
                    home: GeoPoint::new(38.897741, -77.036450).unwrap(),
                },
                http: Http { port: 5000 },
            },
        }
    }

    pub fn follow_distance(mut self, meters: f64) -> Self {
        self.config.follow.follow_distance_m = meters;
        self
    }

    pub fn follow_altitude(mut self, meters: f64) -> Self {
        self.config.follow.follow_altitude_m = meters;
        self
    }

    pub fn min_movement_delta(mut self, meters: f64) -> Self {
        self.config.follow.min_movement_delta_m = meters;
        self
    }

    pub fn follower(self) -> FollowerConfig {
        self.config.follow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn args(extra: &[&str]) -> Args {
        let config = format!("{}/config", env!("CARGO_MANIFEST_DIR"));
        let mut argv = vec!["followme", "--config", config.as_str()];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn load_reads_the_shipped_config_file() -> Result<(), AppConfigError> {
        let config = AppConfig::load(&args(&[]))?;

        assert_eq!(config.follow().follow_distance(), 5.0);
        assert_eq!(config.follow().follow_altitude(), 10.0);
        assert_eq!(config.follow().loop_interval(), Duration::from_millis(500));
        assert_eq!(config.follow().poll_interval(), Duration::from_secs(1));
        assert_eq!(config.follow().smoothing_window(), 5);
        assert_eq!(config.gpsd().address(), "127.0.0.1:2947");
        assert_eq!(config.gpsd().retry_interval(), Duration::from_secs(1));
        assert_eq!(config.http().port(), 5000);
        assert_eq!(
            config.vehicle().connection(),
            &ConnectionString::Udp {
                host: "localhost".to_string(),
                port: 14550
            }
        );
        Ok(())
    }

    #[test]
    fn command_line_flags_override_the_config_file() -> Result<(), AppConfigError> {
        let config = AppConfig::load(&args(&[
            "-d",
            "12.5",
            "-a",
            "25",
            "-p",
            "8080",
            "--loop-interval",
            "250ms",
            "-c",
            "serial:/dev/ttyACM0:57600",
        ]))?;

        assert_eq!(config.follow().follow_distance(), 12.5);
        assert_eq!(config.follow().follow_altitude(), 25.0);
        assert_eq!(config.follow().loop_interval(), Duration::from_millis(250));
        assert_eq!(config.http().port(), 8080);
        assert_eq!(
            config.vehicle().connection(),
            &ConnectionString::Serial {
                device: "/dev/ttyACM0".to_string(),
                baud: Some(57600)
            }
        );
        Ok(())
    }

    #[rstest]
    #[case(&["-d", "0"])]
    #[case(&["--follow-distance=-5"])]
    #[case(&["-a", "0"])]
    #[case(&["--loop-interval", "0s"])]
    fn load_rejects_invalid_values(#[case] extra: &[&str]) {
        let result = AppConfig::load(&args(extra));

        assert!(matches!(result, Err(AppConfigError::Invalid(_))), "expected an invalid config, got {:?}", result);
    }

    #[test]
    fn load_fails_for_a_missing_config_file() {
        let result = AppConfig::load(&Args::parse_from(["followme", "--config", "does_not_exist"]));

        assert!(matches!(result, Err(AppConfigError::Config(_))));
    }
}
