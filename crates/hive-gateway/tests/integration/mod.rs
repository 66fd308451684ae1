//! Integration tests for the gateway REST/WS surface
//!
//! Response-format checks plus round trips through the crates the
//! handlers are built on.

mod rest_api;
mod store_roundtrip;
mod websocket_messages;
