use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Where to reach the vehicle: `udp:<host>:<port>` or `serial:<device>[:<baud>]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionString {
    Udp { host: String, port: u16 },
    Serial { device: String, baud: Option<u32> },
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once(':').ok_or_else(|| ConnectionStringError::MissingScheme(s.to_string()))?;

        match scheme {
            "udp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(|| ConnectionStringError::MissingPort(s.to_string()))?;
                if host.is_empty() {
                    return Err(ConnectionStringError::MissingHost(s.to_string()));
                }
                let port = port.parse::<u16>().map_err(|_| ConnectionStringError::InvalidPort(port.to_string()))?;

                Ok(ConnectionString::Udp {
                    host: host.to_string(),
                    port,
                })
            }
            "serial" => {
                let mut parts = rest.split(':');
                let device = parts.next().filter(|d| !d.is_empty()).ok_or_else(|| ConnectionStringError::MissingDevice(s.to_string()))?;
                let baud = parts
                    .next()
                    .map(|baud| baud.parse::<u32>().map_err(|_| ConnectionStringError::InvalidBaud(baud.to_string())))
                    .transpose()?;
                if parts.next().is_some() {
                    return Err(ConnectionStringError::TrailingInput(s.to_string()));
                }

                Ok(ConnectionString::Serial {
                    device: device.to_string(),
                    baud,
                })
            }
            _ => Err(ConnectionStringError::UnknownScheme(scheme.to_string())),
        }
    }
}

impl Display for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionString::Udp { host, port } => write!(f, "udp:{}:{}", host, port),
            ConnectionString::Serial { device, baud: Some(baud) } => write!(f, "serial:{}:{}", device, baud),
            ConnectionString::Serial { device, baud: None } => write!(f, "serial:{}", device),
        }
    }
}

impl<'de> Deserialize<'de> for ConnectionString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConnectionStringError {
    #[error("connection string '{0}' has no scheme, expected udp:<host>:<port> or serial:<device>[:<baud>]")]
    MissingScheme(String),
    #[error("unknown connection scheme '{0}', expected udp or serial")]
    UnknownScheme(String),
    #[error("connection string '{0}' has no host")]
    MissingHost(String),
    #[error("connection string '{0}' has no port")]
    MissingPort(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("connection string '{0}' has no device")]
    MissingDevice(String),
    #[error("invalid baud rate '{0}'")]
    InvalidBaud(String),
    #[error("unexpected trailing input in connection string '{0}'")]
    TrailingInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("udp:localhost:14550", ConnectionString::Udp { host: "localhost".to_string(), port: 14550 })]
    #[case("udp:0.0.0.0:14551", ConnectionString::Udp { host: "0.0.0.0".to_string(), port: 14551 })]
    #[case("serial:/dev/ttyUSB0", ConnectionString::Serial { device: "/dev/ttyUSB0".to_string(), baud: None })]
    #[case("serial:/dev/ttyACM0:57600", ConnectionString::Serial { device: "/dev/ttyACM0".to_string(), baud: Some(57600) })]
    fn parses_valid_connection_strings(#[case] input: &str, #[case] expected: ConnectionString) -> Result<(), ConnectionStringError> {
        let connection = input.parse::<ConnectionString>()?;

        assert_eq!(connection, expected);
        assert_eq!(connection.to_string(), input);
        Ok(())
    }

    #[rstest]
    #[case("localhost", ConnectionStringError::MissingScheme("localhost".to_string()))]
    #[case("tcp:localhost:5760", ConnectionStringError::UnknownScheme("tcp".to_string()))]
    #[case("udp:localhost", ConnectionStringError::MissingPort("udp:localhost".to_string()))]
    #[case("udp::14550", ConnectionStringError::MissingHost("udp::14550".to_string()))]
    #[case("udp:localhost:port", ConnectionStringError::InvalidPort("port".to_string()))]
    #[case("udp:localhost:70000", ConnectionStringError::InvalidPort("70000".to_string()))]
    #[case("serial:", ConnectionStringError::MissingDevice("serial:".to_string()))]
    #[case("serial:/dev/ttyUSB0:fast", ConnectionStringError::InvalidBaud("fast".to_string()))]
    #[case("serial:/dev/ttyUSB0:57600:8N1", ConnectionStringError::TrailingInput("serial:/dev/ttyUSB0:57600:8N1".to_string()))]
    fn rejects_malformed_connection_strings(#[case] input: &str, #[case] expected: ConnectionStringError) {
        assert_eq!(input.parse::<ConnectionString>(), Err(expected));
    }

    #[test]
    fn deserializes_from_a_string() -> Result<(), serde_json::Error> {
        let connection: ConnectionString = serde_json::from_str(r#""udp:127.0.0.1:14550""#)?;

        assert_eq!(
            connection,
            ConnectionString::Udp {
                host: "127.0.0.1".to_string(),
                port: 14550
            }
        );
        Ok(())
    }
}
