// Upstream module - THE SERVICE SIDE
// Opens the byte-stream transport to the local upstream service

mod connector;

pub use connector::{
    Connector, UpstreamConnector, UpstreamError, UpstreamLink, UpstreamStream, UpstreamTarget,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_UNIX_NAME,
};
