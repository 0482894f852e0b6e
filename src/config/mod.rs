use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::media::{Container, VideoSettings, DEFAULT_FRAME_RATE};
use crate::synth::PollConfig;

pub const SPEECH_KEY_ENV: &str = "ELEVENLABS_API_KEY";
pub const VIDEO_KEY_ENV: &str = "HEDRA_API_KEY";

/// `[speech]` block: the text-to-speech service.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub base_url: Option<String>,
    pub model_id: Option<String>,
    pub sample_rate: Option<u32>,
}

/// `[video]` block: the talking-head video service.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct VideoConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub base_url: Option<String>,
}

/// `[output]` block: where files go and how video is encoded.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub video_format: Container,
    pub frame_rate: u32,
    pub ffmpeg: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./videocast-output"),
            video_format: Container::Mp4,
            frame_rate: DEFAULT_FRAME_RATE,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl OutputConfig {
    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            container: self.video_format,
            frame_rate: self.frame_rate,
            ffmpeg: self.ffmpeg.clone(),
        }
    }
}

/// Top-level videocast config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct VideocastConfig {
    pub speech: Option<SpeechConfig>,
    pub video: Option<VideoConfig>,
    #[serde(default)]
    pub polling: PollConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl VideocastConfig {
    /// Load config from `path`, or ~/.videocast/config.toml. Returns default if the file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(VideocastConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: VideocastConfig =
            toml::from_str(content).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(msg) = self.polling.validate() {
            bail!(msg);
        }
        if self.output.frame_rate == 0 {
            bail!("output.frame_rate must be positive");
        }
        Ok(())
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref sp) = self.speech {
            lines.push("[speech]".to_string());
            display_credentials(&mut lines, sp.api_key.as_deref(), sp.api_key_command.as_deref());
            if let Some(ref url) = sp.base_url {
                lines.push(format!("  base_url = \"{}\"", url));
            }
            if let Some(ref model) = sp.model_id {
                lines.push(format!("  model_id = \"{}\"", model));
            }
            if let Some(rate) = sp.sample_rate {
                lines.push(format!("  sample_rate = {}", rate));
            }
        }
        if let Some(ref v) = self.video {
            lines.push("[video]".to_string());
            display_credentials(&mut lines, v.api_key.as_deref(), v.api_key_command.as_deref());
            if let Some(ref url) = v.base_url {
                lines.push(format!("  base_url = \"{}\"", url));
            }
        }
        if lines.is_empty() {
            lines.push("(no services configured)".to_string());
        }

        let p = &self.polling;
        lines.push("[polling]".to_string());
        lines.push(format!("  base_interval_ms = {}", p.base_interval_ms));
        lines.push(format!("  multiplier = {}", p.multiplier));
        lines.push(format!("  max_interval_ms = {}", p.max_interval_ms));
        lines.push(format!("  max_attempts = {}", p.max_attempts));

        let o = &self.output;
        lines.push("[output]".to_string());
        lines.push(format!("  dir = \"{}\"", o.dir.display()));
        lines.push(format!("  video_format = \"{}\"", o.video_format.extension()));
        lines.push(format!("  frame_rate = {}", o.frame_rate));
        lines.push(format!("  ffmpeg = \"{}\"", o.ffmpeg.display()));
        lines.join("\n")
    }
}

fn display_credentials(lines: &mut Vec<String>, api_key: Option<&str>, command: Option<&str>) {
    if let Some(key) = api_key {
        lines.push(format!("  api_key = \"{}\"", redact(key)));
    }
    if let Some(cmd) = command {
        lines.push(format!("  api_key_command = \"{}\"", cmd));
    }
}

fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Resolve a credential through the chain: CLI flag > env var > config key > config command.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    api_key: Option<&str>,
    api_key_command: Option<&str>,
) -> Result<String> {
    if let Some(key) = cli_flag.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(val);
        }
    }

    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    if let Some(cmd) = api_key_command.filter(|c| !c.is_empty()) {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "api_key_command failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        let secret = String::from_utf8(output.stdout)
            .context("api_key_command output is not valid UTF-8")?
            .trim()
            .to_string();
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    bail!(
        "No API key found. Provide via flag, {} env var, or ~/.videocast/config.toml",
        env_var_name
    );
}

/// Path to the config file: ~/.videocast/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".videocast").join("config.toml"))
}

pub fn default_config_template() -> &'static str {
    r#"# ~/.videocast/config.toml
# Credential resolution order: CLI flag > env var > api_key > api_key_command

[speech]
# api_key = "your-elevenlabs-api-key"
# api_key_command = "your-secrets-manager-command-here"
# model_id = "eleven_multilingual_v2"
# sample_rate = 22050

[video]
# api_key = "sk_hedra-..."
# api_key_command = "your-secrets-manager-command-here"

[polling]
base_interval_ms = 5000
multiplier = 1.5
max_interval_ms = 15000
max_attempts = 120

[output]
dir = "./videocast-output"
# "mp4" needs the ffmpeg binary; "y4m" is raw video written without it
video_format = "mp4"
frame_rate = 30
ffmpeg = "ffmpeg"
"#
}

/// Create the config file at `path` (or the default location) if it doesn't already exist.
pub fn init_config(path: Option<&Path>) -> Result<(bool, PathBuf)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if path.exists() {
        return Ok((false, path));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, default_config_template())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((true, path))
}
