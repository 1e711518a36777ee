//! `spotlink` – command line entry point.
//!
//! * `spotlink run` starts the simulated robot on its own thread plus the
//!   RPC tool server and the debug HTTP server on a Tokio runtime.
//! * `spotlink agent` connects the vision navigator to a running `spotlink run`.
//! * `spotlink config` prints (and optionally writes) the effective settings.
//!
//! Ctrl-C stops the robot through the bridge before shutting down.

mod config;
mod ollama;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use spotlink_agent::{AgentLoop, AgentLoopConfig};
use spotlink_bridge::{Bridge, SimulationLoop};
use spotlink_hal::SimRobot;
use spotlink_server::{DebugHttpServer, RpcServer};
use spotlink_types::SpotError;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "spotlink", version)]
#[command(about = "Simulated legged robot with an RPC tool server and a vision agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation with the tool and debug servers.
    Run(RunArgs),
    /// Drive a running simulation with the vision agent.
    Agent(AgentArgs),
    /// Print the effective configuration.
    Config {
        /// Settings file (default: ~/.spotlink/config.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the effective settings back to the file.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Settings file (default: ~/.spotlink/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not start the RPC tool server.
    #[arg(long)]
    rpc_disable: bool,

    #[arg(long)]
    rpc_host: Option<String>,

    #[arg(long)]
    rpc_port: Option<u16>,

    /// Debug HTTP port; 0 disables the debug server.
    #[arg(long)]
    debug_http_port: Option<u16>,

    /// Simulation ticks per second.
    #[arg(long)]
    tick_hz: Option<f64>,

    /// Exit after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,
}

impl RunArgs {
    fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.rpc_host {
            cfg.rpc_host = host.clone();
        }
        if let Some(port) = self.rpc_port {
            cfg.rpc_port = port;
        }
        if let Some(port) = self.debug_http_port {
            cfg.debug_http_port = port;
        }
        if let Some(hz) = self.tick_hz {
            cfg.tick_hz = hz;
        }
    }
}

#[derive(Args, Debug)]
struct AgentArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tool server URL (default: ws://<rpc_host>:<rpc_port> from the settings).
    #[arg(long)]
    rpc_url: Option<String>,

    /// Vision model served by Ollama.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    ollama_url: Option<String>,

    #[arg(long, default_value_t = 100)]
    max_steps: usize,
}

impl AgentArgs {
    fn agent_config(&self, cfg: &Config) -> AgentLoopConfig {
        AgentLoopConfig {
            rpc_url: self
                .rpc_url
                .clone()
                .unwrap_or_else(|| format!("ws://{}:{}", cfg.rpc_host, cfg.rpc_port)),
            ollama_url: self.ollama_url.clone().unwrap_or_else(|| cfg.ollama_url.clone()),
            model: self.model.clone().unwrap_or_else(|| cfg.vision_model.clone()),
            max_steps: self.max_steps,
            ..AgentLoopConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = telemetry::init_tracing("spotlink");

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Agent(args) => agent(args),
        Command::Config { config, write } => show_config(config, write),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// spotlink run
// ─────────────────────────────────────────────────────────────────────────────

fn run(args: RunArgs) -> Result<(), SpotError> {
    let mut cfg = config::load_effective(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;
    print_banner();

    let (bridge, endpoint) = Bridge::new(cfg.motion_limits());
    let robot = SimRobot::builder()
        .spawn_at(cfg.spawn)
        .camera_resolution(cfg.camera_width, cfg.camera_height)
        .build();
    let mut loop_config = cfg.loop_config();
    loop_config.max_ticks = args.max_ticks;
    let sim = SimulationLoop::new(
        loop_config,
        endpoint,
        Box::new(robot.locomotion),
        Box::new(robot.camera),
    )?;
    let shutdown = sim.shutdown_handle();

    let bridge_ctrlc = bridge.clone();
    let shutdown_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        let receipt = bridge_ctrlc.stop();
        info!(command_id = %receipt.command_id, "stop submitted on Ctrl-C");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("spotlink-io")
        .build()
        .map_err(|e| SpotError::Transport(format!("failed to start async runtime: {e}")))?;

    if args.rpc_disable {
        println!("  RPC tool server   {}", "disabled".dimmed());
    } else {
        let server = RpcServer::new(bridge.clone()).with_addr(cfg.rpc_host.clone(), cfg.rpc_port);
        println!(
            "  RPC tool server   {}",
            format!("ws://{}:{}", cfg.rpc_host, cfg.rpc_port).bold()
        );
        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                warn!(error = %e, "RPC tool server unavailable; simulation keeps running");
            }
        });
    }

    if cfg.debug_http_port == 0 {
        println!("  Debug HTTP server {}", "disabled".dimmed());
    } else {
        let server = DebugHttpServer::new(bridge.clone())
            .with_addr(cfg.rpc_host.clone(), cfg.debug_http_port);
        println!(
            "  Debug HTTP server {}",
            format!("http://{}:{}", cfg.rpc_host, cfg.debug_http_port).bold()
        );
        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                warn!(error = %e, "debug HTTP server unavailable; simulation keeps running");
            }
        });
    }
    println!();

    let sim_thread = sim
        .spawn()
        .map_err(|e| SpotError::Config(format!("failed to start simulation thread: {e}")))?;
    let ticks = sim_thread
        .join()
        .map_err(|_| SpotError::Config("simulation thread panicked".into()))?;

    runtime.shutdown_timeout(Duration::from_secs(1));
    let state = bridge.get_state();
    println!(
        "  {} after {ticks} ticks ({:.1} s simulated)",
        "✓ Simulation stopped".green(),
        state.sim_time_s
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// spotlink agent
// ─────────────────────────────────────────────────────────────────────────────

fn agent(args: AgentArgs) -> Result<(), SpotError> {
    let cfg = config::load_effective(args.config.as_deref())?;
    let agent_config = args.agent_config(&cfg);

    print!("  Probing Ollama at {} … ", agent_config.ollama_url.dimmed());
    match ollama::fetch_models(&agent_config.ollama_url) {
        Ok(models) if ollama::has_model(&models, &agent_config.model) => {
            println!("{}", "online".green());
        }
        Ok(_) => {
            println!("{}", "online".green());
            println!(
                "  {} model {} is not downloaded; run `{}`",
                "⚠".yellow(),
                agent_config.model.bold(),
                format!("ollama pull {}", agent_config.model).bold()
            );
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            warn!(error = %e, "vision model server not reachable; steps will fail until it is");
        }
    }

    let mut agent = AgentLoop::new(agent_config);
    let shutdown: Arc<AtomicBool> = agent.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("{}", "⚠  Ctrl-C received – finishing the current step …".yellow().bold());
        shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| SpotError::Transport(format!("failed to start async runtime: {e}")))?;
    let summary = runtime
        .block_on(agent.run())
        .map_err(|e| SpotError::Transport(e.to_string()))?;

    println!();
    println!("  {}", "Navigation complete".bold());
    println!("  Steps:            {}", summary.steps);
    println!("  Moves completed:  {}", summary.moves_completed);
    println!("  Failed steps:     {}", summary.failed_steps);
    println!("  Forward distance: {:.2} m", summary.forward_distance_m);
    if summary.gave_up {
        println!("  {}", "Gave up: no way around the obstacle.".yellow());
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// spotlink config
// ─────────────────────────────────────────────────────────────────────────────

fn show_config(path: Option<PathBuf>, write: bool) -> Result<(), SpotError> {
    let cfg = config::load_effective(path.as_deref())?;
    cfg.validate()?;
    let rendered = toml::to_string_pretty(&cfg)
        .map_err(|e| SpotError::Serialization(e.to_string()))?;
    println!("{rendered}");
    if write {
        let target = path.unwrap_or_else(config::config_path);
        config::save_to(&cfg, &target)?;
        println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            target.display().to_string().bold()
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____             __  __    _       __  "#.bold().cyan());
    println!("{}", r#"  / ___/____  ____  / /_/ /   (_)___  / /__"#.bold().cyan());
    println!("{}", r#"  \__ \/ __ \/ __ \/ __/ /   / / __ \/ //_/"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ / /_/ / /_/ /___/ / / / / ,<   "#.bold().cyan());
    println!("{}", r#"/____/ .___/\____/\__/_____/_/_/ /_/_/|_|  "#.bold().cyan());
    println!("{}", r#"    /_/                                    "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "SpotLink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Simulated legged robot bridge");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "spotlink",
            "run",
            "--rpc-port",
            "9000",
            "--debug-http-port",
            "0",
            "--tick-hz",
            "25",
            "--rpc-disable",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.rpc_disable);

        let mut cfg = Config::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.rpc_port, 9000);
        assert_eq!(cfg.debug_http_port, 0);
        assert_eq!(cfg.tick_hz, 25.0);
        assert_eq!(cfg.rpc_host, "127.0.0.1");
    }

    #[test]
    fn agent_url_defaults_to_configured_tool_server() {
        let cli = Cli::try_parse_from(["spotlink", "agent", "--max-steps", "5"]).unwrap();
        let Command::Agent(args) = cli.command else {
            panic!("expected agent");
        };
        let cfg = Config {
            rpc_port: 8100,
            ..Config::default()
        };
        let agent = args.agent_config(&cfg);
        assert_eq!(agent.rpc_url, "ws://127.0.0.1:8100");
        assert_eq!(agent.model, "qwen3-vl:4b");
        assert_eq!(agent.max_steps, 5);
    }

    #[test]
    fn agent_flags_win_over_config() {
        let cli = Cli::try_parse_from([
            "spotlink",
            "agent",
            "--rpc-url",
            "ws://robot:8000",
            "--model",
            "llava:7b",
        ])
        .unwrap();
        let Command::Agent(args) = cli.command else {
            panic!("expected agent");
        };
        let agent = args.agent_config(&Config::default());
        assert_eq!(agent.rpc_url, "ws://robot:8000");
        assert_eq!(agent.model, "llava:7b");
        assert_eq!(agent.max_steps, 100);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["spotlink", "fly"]).is_err());
    }
}
