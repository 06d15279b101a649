#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use base64 as _;
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tokio_tungstenite as _;
#[cfg(test)]
use tower as _;

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws_transport;

// Re-export primary types
pub use bootstrap::{
    AxumContext, Collaborators, CorsConfig, LogBroadcast, ServerConfig, bootstrap, serve,
    start_server,
};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
pub use ws_transport::SocketTransport;
