mod averager;
mod client;
mod report;
mod source;

pub use client::{Config, PositionSourceClient};
pub use source::GpsdSource;
