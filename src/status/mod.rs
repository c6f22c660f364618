mod server;

pub use server::{bind, serve};
