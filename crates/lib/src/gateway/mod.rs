//! Gateway: HTTP + WebSocket transport for the listing pipeline.
//!
//! Single port serves HTTP (health) and WebSocket. Clients send `message` events carrying a
//! raw command and receive exactly one `content` or `error` event back per message. When token
//! auth is configured, a `connect` request must succeed first.

mod protocol;
mod server;

pub use protocol::{
    event_frame, reply_frame, ClientFrame, ConnectParams, HelloOk, WsEvent, WsRequest, WsResponse,
    MESSAGE_EVENT,
};
pub use server::{run_gateway, GatewayState};
