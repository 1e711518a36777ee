//! `spotlink-server` – external surfaces over a [`Bridge`][spotlink_bridge::Bridge].
//!
//! Both servers hold nothing but a `Bridge` clone handed to them at
//! construction; they translate requests into facade calls and never touch
//! the simulation directly.
//!
//! - [`tools`] – [`ToolRouter`]: the `get_state` / `get_camera` / `move` /
//!   `stop` tool surface, independent of any transport.
//! - [`rpc`] – [`RpcServer`]: JSON-RPC 2.0 over WebSocket (default port
//!   `8000`), used by the agent.
//! - [`debug_http`] – [`DebugHttpServer`]: browser-friendly `GET` endpoints
//!   (default port `8001`).
//!
//! # Usage
//!
//! ```rust,no_run
//! use spotlink_bridge::{Bridge, MotionLimits};
//! use spotlink_server::{DebugHttpServer, RpcServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (bridge, _endpoint) = Bridge::new(MotionLimits::default());
//!     tokio::spawn(RpcServer::new(bridge.clone()).run());
//!     DebugHttpServer::new(bridge).run().await.expect("debug server failed");
//! }
//! ```

pub mod debug_http;
pub mod rpc;
pub mod tools;

pub use debug_http::DebugHttpServer;
pub use rpc::RpcServer;
pub use tools::{ToolError, ToolRouter};
