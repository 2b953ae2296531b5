use revu_core::auth::AuthError;
use revu_core::auth::transport::TransportError;
use revu_core::storage::StoreError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("{}", .0)]
    Auth(#[from] AuthError),

    #[error("Transport::{}", .0)]
    Transport(#[from] TransportError),

    #[error("Store::{}", .0)]
    Store(#[from] StoreError),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),
}
