pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod merge;
pub mod record;
pub mod store;
pub mod subscription;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
