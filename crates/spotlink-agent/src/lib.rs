//! `spotlink-agent` – a vision-guided navigator that drives the robot purely
//! through the tool server.
//!
//! The agent holds no reference to the simulation; everything it knows comes
//! from `get_state` / `get_camera` and everything it does goes through
//! `move` / `stop`, exactly like any other client.
//!
//! - [`rpc_client`] – [`RpcClient`]: JSON-RPC 2.0 over WebSocket.
//! - [`vision`] – [`VisionDriver`]: Ollama `/api/generate` with an image.
//! - [`policy`] – [`NavigationPolicy`]: verdict → move.
//! - [`agent_loop`] – [`AgentLoop`]: look, ask, move, wait.

pub mod agent_loop;
pub mod policy;
pub mod rpc_client;
pub mod vision;

pub use agent_loop::{AgentLoop, AgentLoopConfig, CommandOutcome, RunSummary, StepError};
pub use policy::{Decision, NavigationPolicy, Verdict};
pub use rpc_client::{RpcClient, RpcError};
pub use vision::{Vision, VisionDriver, VisionError};
