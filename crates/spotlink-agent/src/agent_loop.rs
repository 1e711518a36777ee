//! [`AgentLoop`] – look, ask, move, wait.
//!
//! Each step:
//!
//! 1. **Look** – fetch the latest camera frame and state over the tool
//!    server.
//! 2. **Ask** – send the frame to the [`Vision`] model with
//!    [`NAVIGATION_PROMPT`].
//! 3. **Decide** – map the answer through the [`NavigationPolicy`].
//! 4. **Move** – submit the move and poll `get_state` until that command
//!    leaves the executor or [`AgentLoopConfig::command_timeout`] expires.
//!
//! A failed step is logged and retried after a back-off.  Only a lost
//! connection ends the run early.
//!
//! # Example
//!
//! ```rust,no_run
//! use spotlink_agent::{AgentLoop, AgentLoopConfig};
//!
//! # async fn demo() {
//! let mut agent = AgentLoop::new(AgentLoopConfig::default());
//! match agent.run().await {
//!     Ok(summary) => println!("walked {:.2} m", summary.forward_distance_m),
//!     Err(e) => eprintln!("agent stopped: {e}"),
//! }
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use spotlink_types::Direction;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::policy::{Decision, NAVIGATION_PROMPT, NavigationPolicy, Verdict};
use crate::rpc_client::{RpcClient, RpcError};
use crate::vision::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL, Vision, VisionDriver, VisionError};

/// Idle snapshots this far past the first poll mean the command has come
/// and gone between polls.  One tick to take it, one more if it had to wait
/// out a preemption.
const SETTLE_TICKS: u64 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// WebSocket URL of the tool server.
    pub rpc_url: String,
    pub ollama_url: String,
    pub model: String,
    pub max_steps: usize,
    /// How long to wait for one command before stopping the robot.
    pub command_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after a failed step.
    pub retry_backoff: Duration,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            rpc_url: "ws://127.0.0.1:8000".to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_steps: 100,
            command_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// How a submitted command left the executor, as seen by polling.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Completed,
    Interrupted,
    Failed(String),
    /// The executor went idle without a terminal status being observed.
    Settled,
    /// A newer command from another client took its place.
    Superseded(u64),
    /// A pending stop swallowed the submission.
    Dropped,
    /// The agent gave up waiting and stopped the robot.
    TimedOut,
}

impl CommandOutcome {
    pub fn ran_to_completion(&self) -> bool {
        matches!(self, CommandOutcome::Completed | CommandOutcome::Settled)
    }
}

#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("vision model: {0}")]
    Vision(#[from] VisionError),
    #[error("camera unavailable: {0}")]
    Camera(String),
    #[error("malformed tool reply: {0}")]
    BadReply(String),
}

/// Totals for one [`AgentLoop::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub moves_completed: usize,
    pub failed_steps: usize,
    /// Forward metres of moves that ran to completion.
    pub forward_distance_m: f32,
    /// The policy ran out of ideas and stopped the robot.
    pub gave_up: bool,
}

enum StepResult {
    Moved {
        direction: Direction,
        length: f32,
        outcome: CommandOutcome,
    },
    GaveUp,
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Watches successive `get_state` results for the end of one command.
///
/// Terminal statuses are published for a single tick, so a poller can miss
/// them; an idle executor after the command was seen running (or after
/// [`SETTLE_TICKS`] snapshots) counts as [`CommandOutcome::Settled`].
#[derive(Debug)]
pub struct CompletionTracker {
    command_id: u64,
    baseline: Option<u64>,
    seen_running: bool,
}

impl CompletionTracker {
    pub fn new(command_id: u64) -> Self {
        Self {
            command_id,
            baseline: None,
            seen_running: false,
        }
    }

    pub fn observe(&mut self, state: &Value) -> Option<CommandOutcome> {
        let sequence = state.get("sequence").and_then(Value::as_u64)?;
        let baseline = *self.baseline.get_or_insert(sequence);
        let status = state.get("status")?;
        let kind = status.get("state").and_then(Value::as_str).unwrap_or_default();

        match status.get("command_id").and_then(Value::as_u64) {
            Some(id) if id == self.command_id => {
                self.seen_running = true;
                match kind {
                    "completed" => Some(CommandOutcome::Completed),
                    "interrupted" => Some(CommandOutcome::Interrupted),
                    "failed" => Some(CommandOutcome::Failed(
                        status
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    )),
                    _ => None,
                }
            }
            Some(id) if id > self.command_id => Some(CommandOutcome::Superseded(id)),
            _ => {
                let settled = kind == "idle"
                    && (self.seen_running || sequence >= baseline + SETTLE_TICKS);
                settled.then_some(CommandOutcome::Settled)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct AgentLoop<V> {
    config: AgentLoopConfig,
    vision: V,
    policy: NavigationPolicy,
    shutdown: Arc<AtomicBool>,
}

impl AgentLoop<VisionDriver> {
    /// Agent backed by the Ollama model named in `config`.
    pub fn new(config: AgentLoopConfig) -> Self {
        let vision = VisionDriver::new(config.ollama_url.clone(), config.model.clone());
        Self::with_vision(config, vision)
    }
}

impl<V: Vision> AgentLoop<V> {
    pub fn with_vision(config: AgentLoopConfig, vision: V) -> Self {
        Self {
            config,
            vision,
            policy: NavigationPolicy::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_policy(mut self, policy: NavigationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    /// Raising the flag ends the run before the next step.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run up to `max_steps` steps against the tool server.
    ///
    /// # Errors
    ///
    /// [`RpcError`] if the server cannot be reached or the connection drops.
    /// Every other failure only costs the step it happened in.
    pub async fn run(&mut self) -> Result<RunSummary, RpcError> {
        let mut client = RpcClient::connect(&self.config.rpc_url).await?;
        let mut summary = RunSummary::default();
        info!(
            max_steps = self.config.max_steps,
            model = %self.config.model,
            "navigation agent started"
        );

        while summary.steps < self.config.max_steps {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("agent shutdown requested");
                break;
            }
            summary.steps += 1;
            let step = summary.steps;

            match self.step(&mut client).await {
                Ok(StepResult::Moved {
                    direction,
                    length,
                    outcome,
                }) => {
                    info!(step, %direction, length, ?outcome, "step finished");
                    if outcome.ran_to_completion() {
                        summary.moves_completed += 1;
                        if direction == Direction::Forward {
                            summary.forward_distance_m += length;
                        }
                    }
                }
                Ok(StepResult::GaveUp) => {
                    warn!(step, "no way around the obstacle; robot stopped");
                    summary.gave_up = true;
                    break;
                }
                Err(StepError::Rpc(e)) if e.is_fatal() => {
                    error!(step, error = %e, "lost the tool server");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed_steps += 1;
                    warn!(step, error = %e, "step failed; backing off");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
            }
        }

        info!(
            steps = summary.steps,
            forward_m = summary.forward_distance_m,
            "navigation finished"
        );
        client.close().await;
        Ok(summary)
    }

    async fn step(&mut self, client: &mut RpcClient) -> Result<StepResult, StepError> {
        let camera = client.call_tool("get_camera", json!({})).await?;
        if camera.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = camera.get("error").and_then(Value::as_str).unwrap_or("unknown");
            return Err(StepError::Camera(reason.to_string()));
        }
        let image = camera
            .get("image_base64")
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::BadReply("get_camera without image_base64".into()))?;

        let state = client.call_tool("get_state", json!({})).await?;
        debug!(pose = %state["pose"], status = %state["status"]["state"], "robot state");

        let answer = self.vision.describe(image, NAVIGATION_PROMPT).await?;
        let verdict = Verdict::parse(&answer);
        debug!(?verdict, %answer, "vision answer");

        let (direction, length) = match self.policy.decide(verdict) {
            Decision::Move { direction, length } => (direction, length),
            Decision::GiveUp => {
                client.call_tool("stop", json!({})).await?;
                return Ok(StepResult::GaveUp);
            }
        };

        let ack = client
            .call_tool(
                "move",
                json!({ "direction": direction.as_str(), "length": length }),
            )
            .await?;
        let command_id = ack
            .get("command_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| StepError::BadReply("move without command_id".into()))?;

        let outcome = if ack.get("held_by_stop").and_then(Value::as_bool) == Some(true) {
            CommandOutcome::Dropped
        } else {
            self.wait_for(client, command_id).await?
        };
        Ok(StepResult::Moved {
            direction,
            length,
            outcome,
        })
    }

    async fn wait_for(
        &self,
        client: &mut RpcClient,
        command_id: u64,
    ) -> Result<CommandOutcome, StepError> {
        let deadline = Instant::now() + self.config.command_timeout;
        let mut tracker = CompletionTracker::new(command_id);
        loop {
            let state = client.call_tool("get_state", json!({})).await?;
            if let Some(outcome) = tracker.observe(&state) {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                warn!(command_id, "command did not finish in time; stopping");
                client.call_tool("stop", json!({})).await?;
                return Ok(CommandOutcome::TimedOut);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(sequence: u64, status: Value) -> Value {
        json!({ "sequence": sequence, "status": status })
    }

    #[test]
    fn terminal_status_of_our_command_is_reported() {
        let mut t = CompletionTracker::new(4);
        assert_eq!(
            t.observe(&state(10, json!({ "state": "executing", "command_id": 4 }))),
            None
        );
        assert_eq!(
            t.observe(&state(11, json!({ "state": "completed", "command_id": 4 }))),
            Some(CommandOutcome::Completed)
        );

        let mut t = CompletionTracker::new(2);
        assert_eq!(
            t.observe(&state(5, json!({ "state": "failed", "command_id": 2, "reason": "fell" }))),
            Some(CommandOutcome::Failed("fell".into()))
        );
    }

    #[test]
    fn idle_after_running_counts_as_settled() {
        let mut t = CompletionTracker::new(4);
        t.observe(&state(10, json!({ "state": "executing", "command_id": 4 })));
        assert_eq!(
            t.observe(&state(12, json!({ "state": "idle" }))),
            Some(CommandOutcome::Settled)
        );
    }

    #[test]
    fn idle_before_pickup_is_not_settled() {
        let mut t = CompletionTracker::new(4);
        assert_eq!(t.observe(&state(10, json!({ "state": "idle" }))), None);
        assert_eq!(t.observe(&state(12, json!({ "state": "idle" }))), None);
        assert_eq!(
            t.observe(&state(13, json!({ "state": "idle" }))),
            Some(CommandOutcome::Settled)
        );
    }

    #[test]
    fn older_command_winding_down_is_ignored() {
        let mut t = CompletionTracker::new(4);
        assert_eq!(
            t.observe(&state(10, json!({ "state": "executing", "command_id": 3 }))),
            None
        );
        assert_eq!(
            t.observe(&state(11, json!({ "state": "interrupted", "command_id": 3, "superseded_by": 4 }))),
            None
        );
    }

    #[test]
    fn newer_command_means_superseded() {
        let mut t = CompletionTracker::new(4);
        assert_eq!(
            t.observe(&state(10, json!({ "state": "executing", "command_id": 6 }))),
            Some(CommandOutcome::Superseded(6))
        );
    }

    #[test]
    fn unstarted_state_without_sequence_is_skipped() {
        let mut t = CompletionTracker::new(1);
        assert_eq!(t.observe(&json!({ "status": { "state": "idle" } })), None);
    }

    #[test]
    fn default_config_points_at_local_services() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.rpc_url, "ws://127.0.0.1:8000");
        assert_eq!(config.model, "qwen3-vl:4b");
        assert_eq!(config.max_steps, 100);
    }
}
