//! Integration tests: the axum router in front of mockito upstreams.

mod mock_server;

mod api;
mod streaming;
