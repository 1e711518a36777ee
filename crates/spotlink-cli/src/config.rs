//! Settings file – reads/writes `~/.spotlink/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Precedence, lowest first: defaults, file, `SPOTLINK_*` environment,
//! command-line flags (applied in `main`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spotlink_bridge::{LoopConfig, MotionLimits};
use spotlink_types::SpotError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bind host of the RPC tool server.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Debug HTTP port; `0` disables the debug server.
    #[serde(default = "default_debug_http_port")]
    pub debug_http_port: u16,

    /// Simulation ticks per second (also the camera rate).
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,

    /// Physics steps per tick.  Each step lasts `1 / (tick_hz * physics_substeps)`
    /// seconds so simulated time keeps pace with the wall clock.
    #[serde(default = "default_physics_substeps")]
    pub physics_substeps: u32,

    #[serde(default = "default_walk_speed")]
    pub walk_speed: f32,

    #[serde(default = "default_walk_speed")]
    pub strafe_speed: f32,

    /// Turning rate, rad/s.
    #[serde(default = "default_yaw_rate")]
    pub yaw_rate: f32,

    /// Ceiling for per-command speed overrides, m/s.
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,

    #[serde(default = "default_max_yaw_rate")]
    pub max_yaw_rate: f32,

    #[serde(default = "default_camera_width")]
    pub camera_width: u32,

    #[serde(default = "default_camera_height")]
    pub camera_height: u32,

    /// Where the robot appears, metres.
    #[serde(default = "default_spawn")]
    pub spawn: [f32; 3],

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rpc_port() -> u16 {
    spotlink_server::rpc::DEFAULT_PORT
}
fn default_debug_http_port() -> u16 {
    spotlink_server::debug_http::DEFAULT_PORT
}
fn default_tick_hz() -> f64 {
    50.0
}
fn default_physics_substeps() -> u32 {
    10
}
fn default_walk_speed() -> f32 {
    0.5
}
fn default_yaw_rate() -> f32 {
    0.8
}
fn default_max_speed() -> f32 {
    1.5
}
fn default_max_yaw_rate() -> f32 {
    2.0
}
fn default_camera_width() -> u32 {
    512
}
fn default_camera_height() -> u32 {
    256
}
fn default_spawn() -> [f32; 3] {
    [0.0, 0.0, 0.8]
}
fn default_ollama_url() -> String {
    spotlink_agent::vision::DEFAULT_OLLAMA_URL.to_string()
}
fn default_vision_model() -> String {
    spotlink_agent::vision::DEFAULT_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            debug_http_port: default_debug_http_port(),
            tick_hz: default_tick_hz(),
            physics_substeps: default_physics_substeps(),
            walk_speed: default_walk_speed(),
            strafe_speed: default_walk_speed(),
            yaw_rate: default_yaw_rate(),
            max_speed: default_max_speed(),
            max_yaw_rate: default_max_yaw_rate(),
            camera_width: default_camera_width(),
            camera_height: default_camera_height(),
            spawn: default_spawn(),
            ollama_url: default_ollama_url(),
            vision_model: default_vision_model(),
        }
    }
}

impl Config {
    pub fn motion_limits(&self) -> MotionLimits {
        MotionLimits {
            walk_speed: self.walk_speed,
            strafe_speed: self.strafe_speed,
            yaw_rate: self.yaw_rate,
            max_speed: self.max_speed,
            max_yaw_rate: self.max_yaw_rate,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        let substeps = self.physics_substeps.max(1);
        LoopConfig {
            tick_hz: self.tick_hz,
            physics_substeps: substeps,
            physics_dt: (1.0 / (self.tick_hz * substeps as f64)) as f32,
            ..LoopConfig::default()
        }
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SpotError> {
        self.loop_config().period()?;
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(SpotError::Config(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera_width, self.camera_height
            )));
        }
        let speeds = [
            ("walk_speed", self.walk_speed, self.max_speed),
            ("strafe_speed", self.strafe_speed, self.max_speed),
            ("yaw_rate", self.yaw_rate, self.max_yaw_rate),
        ];
        for (name, value, cap) in speeds {
            if !(value.is_finite() && value > 0.0 && value <= cap) {
                return Err(SpotError::Config(format!(
                    "{name} must be in (0, {cap}], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Return the path to `~/.spotlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".spotlink").join("config.toml")
}

/// Load the config from `path`.  `Ok(None)` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, SpotError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SpotError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| SpotError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Defaults, overlaid by the file at `path` (or the default location) and
/// then by the environment.
pub fn load_effective(path: Option<&Path>) -> Result<Config, SpotError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `SPOTLINK_*` environment variable overrides to `cfg`.
/// Values that do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SPOTLINK_RPC_HOST` | `rpc_host` |
/// | `SPOTLINK_RPC_PORT` | `rpc_port` |
/// | `SPOTLINK_DEBUG_HTTP_PORT` | `debug_http_port` |
/// | `SPOTLINK_TICK_HZ` | `tick_hz` |
/// | `SPOTLINK_OLLAMA_URL` | `ollama_url` |
/// | `SPOTLINK_VISION_MODEL` | `vision_model` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SPOTLINK_RPC_HOST") {
        cfg.rpc_host = v;
    }
    if let Ok(v) = std::env::var("SPOTLINK_RPC_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.rpc_port = port;
    }
    if let Ok(v) = std::env::var("SPOTLINK_DEBUG_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.debug_http_port = port;
    }
    if let Ok(v) = std::env::var("SPOTLINK_TICK_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.tick_hz = hz;
    }
    if let Ok(v) = std::env::var("SPOTLINK_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("SPOTLINK_VISION_MODEL") {
        cfg.vision_model = v;
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), SpotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SpotError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                SpotError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SpotError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| SpotError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_simulation_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.rpc_port, 8000);
        assert_eq!(cfg.debug_http_port, 8001);
        assert_eq!(cfg.vision_model, "qwen3-vl:4b");
        assert_eq!(cfg.motion_limits(), MotionLimits::default());

        let lc = cfg.loop_config();
        assert_eq!(lc.physics_substeps, 10);
        assert!((lc.physics_dt - 1.0 / 500.0).abs() < 1e-9);
        assert!(lc.realtime);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "rpc_port = 9100\nyaw_rate = 1.2\n").unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.rpc_port, 9100);
        assert_eq!(cfg.yaw_rate, 1.2);
        assert_eq!(cfg.debug_http_port, 8001);
        assert_eq!(cfg.camera_width, 512);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "rpc_port = \"lots\"").unwrap();
        assert!(matches!(load_from(&path), Err(SpotError::Config(_))));
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = Config {
            tick_hz: 100.0,
            spawn: [1.0, -2.0, 0.6],
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");
        assert_eq!(load_from(&path).expect("load").expect("some"), cfg);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
        assert!(path.to_string_lossy().contains(".spotlink"));
    }

    #[test]
    fn loop_config_keeps_sim_time_in_step_with_tick_rate() {
        let cfg = Config {
            tick_hz: 25.0,
            physics_substeps: 4,
            ..Config::default()
        };
        let lc = cfg.loop_config();
        assert!((lc.tick_dt() - 1.0 / 25.0).abs() < 1e-6);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let blind = Config {
            camera_height: 0,
            ..Config::default()
        };
        assert!(blind.validate().is_err());
        let too_fast = Config {
            walk_speed: 3.0,
            ..Config::default()
        };
        assert!(too_fast.validate().is_err());
        let no_ticks = Config {
            tick_hz: 0.0,
            ..Config::default()
        };
        assert!(no_ticks.validate().is_err());
        let glacial = Config {
            tick_hz: 1e-30,
            ..Config::default()
        };
        assert!(matches!(glacial.validate(), Err(SpotError::Config(_))));
    }

    #[test]
    fn env_overrides_ports_and_model() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("SPOTLINK_RPC_PORT", "9200");
            std::env::set_var("SPOTLINK_VISION_MODEL", "llava:7b");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.rpc_port, 9200);
        assert_eq!(cfg.vision_model, "llava:7b");
        unsafe {
            std::env::remove_var("SPOTLINK_RPC_PORT");
            std::env::remove_var("SPOTLINK_VISION_MODEL");
        }
    }

    #[test]
    fn env_override_ignores_invalid_port() {
        // SAFETY: this variable is only touched by this test.
        unsafe { std::env::set_var("SPOTLINK_DEBUG_HTTP_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.debug_http_port, 8001);
        unsafe { std::env::remove_var("SPOTLINK_DEBUG_HTTP_PORT") };
    }
}
