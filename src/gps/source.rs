use crate::gps::report::Report;
use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use std::fmt::Debug;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, instrument};

pub const DEFAULT_GPSD_ADDRESS: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

pub type ReportStream = Pin<Box<dyn Stream<Item = Result<Report, PositionSourceError>> + Send>>;

/// A subscribable stream of receiver reports. Every call to `connect` opens a fresh
/// subscription.
#[async_trait]
pub trait PositionSource: Debug + Send + Sync {
    async fn connect(&self) -> Result<ReportStream, PositionSourceError>;
}

/// Reads reports from a gpsd daemon over its TCP JSON protocol.
#[derive(Debug, Clone)]
pub struct GpsdSource {
    address: String,
}

impl GpsdSource {
    pub fn new(address: impl Into<String>) -> Self {
        GpsdSource { address: address.into() }
    }
}

impl Default for GpsdSource {
    fn default() -> Self {
        GpsdSource::new(DEFAULT_GPSD_ADDRESS)
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<ReportStream, PositionSourceError> {
        let mut stream = TcpStream::connect(&self.address).await.map_err(PositionSourceError::Connect)?;
        stream.write_all(WATCH_COMMAND).await.map_err(PositionSourceError::Connect)?;
        debug!("Enabled gpsd watch mode");

        let lines = LinesStream::new(BufReader::new(stream).lines());
        let reports = lines.map(|line| match line {
            Ok(line) => Report::from_line(&line).map_err(|e| PositionSourceError::Decode { source: e, line }),
            Err(e) => Err(PositionSourceError::Io(e)),
        });

        Ok(Box::pin(reports))
    }
}

#[derive(Error, Debug)]
pub enum PositionSourceError {
    #[error("unable to connect to the position source: {0}")]
    Connect(#[source] io::Error),
    #[error("position source read failed: {0}")]
    Io(#[source] io::Error),
    #[error("unable to decode report '{line}': {source}")]
    Decode { source: serde_json::Error, line: String },
    #[error("no data for {0:?}")]
    Stale(Duration),
    #[error("position source closed the stream")]
    Closed,
}
