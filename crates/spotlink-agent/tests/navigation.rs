//! The agent against a real tool server and simulation, with a scripted
//! model standing in for Ollama.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::Ordering;
use std::time::Duration;

use spotlink_agent::{AgentLoop, AgentLoopConfig, RpcClient, RpcError, Vision, VisionError};
use spotlink_bridge::{Bridge, LoopConfig, MotionLimits, SimulationLoop};
use spotlink_hal::SimRobot;
use spotlink_server::RpcServer;

struct ScriptedVision {
    answers: Mutex<VecDeque<&'static str>>,
}

impl ScriptedVision {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
        }
    }
}

impl Vision for ScriptedVision {
    async fn describe(&self, png_base64: &str, _prompt: &str) -> Result<String, VisionError> {
        assert!(!png_base64.is_empty());
        let next = self.answers.lock().unwrap().pop_front();
        next.map(str::to_string)
            .ok_or_else(|| VisionError::BadResponse("script exhausted".into()))
    }
}

fn fast_config(rpc_url: String, max_steps: usize) -> AgentLoopConfig {
    AgentLoopConfig {
        rpc_url,
        max_steps,
        command_timeout: Duration::from_secs(20),
        poll_interval: Duration::from_millis(5),
        retry_backoff: Duration::from_millis(5),
        ..AgentLoopConfig::default()
    }
}

async fn start_server(bridge: &Bridge) -> String {
    let server = RpcServer::new(bridge.clone()).with_addr("127.0.0.1", 0);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    format!("ws://{addr}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn agent_walks_then_searches_and_gives_up() {
    let (bridge, endpoint) = Bridge::new(MotionLimits::default());
    let robot = SimRobot::builder().camera_resolution(32, 16).build();
    let sim = SimulationLoop::new(
        LoopConfig::fast(),
        endpoint,
        Box::new(robot.locomotion),
        Box::new(robot.camera),
    )
    .unwrap();
    let shutdown = sim.shutdown_handle();
    let sim_thread = sim.spawn().unwrap();

    let url = start_server(&bridge).await;
    let vision = ScriptedVision::new(&[
        "FORWARD\nopen floor",
        "SLOW\nsomething ahead",
        "BLOCKED",
        "BLOCKED",
        "BLOCKED",
        "BLOCKED",
        "BLOCKED",
    ]);
    let mut agent = AgentLoop::with_vision(fast_config(url, 20), vision);
    let summary = agent.run().await.unwrap();

    shutdown.store(true, Ordering::SeqCst);
    sim_thread.join().unwrap();

    assert_eq!(summary.steps, 7);
    assert!(summary.gave_up);
    assert_eq!(summary.failed_steps, 0);
    assert_eq!(summary.moves_completed, 6);
    assert!((summary.forward_distance_m - 1.5).abs() < 1e-6);

    let pose = bridge.get_state().pose;
    assert!((pose.position[0] - 1.5).abs() < 1e-2, "x = {}", pose.position[0]);
    assert!(pose.position[1].abs() < 1e-2);
    assert!(pose.yaw_rad.abs() < 1e-2, "yaw = {}", pose.yaw_rad);
}

#[tokio::test]
async fn missing_camera_frames_cost_steps_not_the_run() {
    // No simulation: the bridge never publishes a frame.
    let (bridge, _endpoint) = Bridge::new(MotionLimits::default());
    let url = start_server(&bridge).await;

    let mut agent = AgentLoop::with_vision(fast_config(url, 3), ScriptedVision::new(&[]));
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.steps, 3);
    assert_eq!(summary.failed_steps, 3);
    assert_eq!(summary.moves_completed, 0);
    assert!(!summary.gave_up);
}

#[tokio::test]
async fn client_lists_the_four_tools() {
    let (bridge, _endpoint) = Bridge::new(MotionLimits::default());
    let url = start_server(&bridge).await;

    let mut client = RpcClient::connect(&url).await.unwrap();
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools, ["get_state", "get_camera", "move", "stop"]);

    let err = client
        .call_tool("move", serde_json::json!({ "direction": "up", "length": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { code: -32602, .. }));
    client.close().await;
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut agent = AgentLoop::with_vision(
        fast_config(format!("ws://{addr}"), 1),
        ScriptedVision::new(&[]),
    );
    let err = agent.run().await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
}
