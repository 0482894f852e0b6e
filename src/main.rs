use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use videocast::config::{self, VideocastConfig, SPEECH_KEY_ENV, VIDEO_KEY_ENV};
use videocast::media::{self, audio, Container, VideoSettings};
use videocast::output::files::{run_timestamp, OutputWriter, WrittenFile};
use videocast::output::{json as json_out, table};
use videocast::pipeline::{Cast, Coordinator, MissingSegment, PipelineError};
use videocast::script::{self, Script};
use videocast::services::elevenlabs::ElevenLabsClient;
use videocast::services::hedra::{self, HedraClient};
use videocast::services::{Portrait, SpeechService};
use videocast::synth::{FailureCategory, SegmentStage, SegmentSynthesizer};

#[derive(Parser)]
#[command(name = "videocast", version, about = "Turn a dialogue script into talking-head video and audio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to config file (default: ~/.videocast/config.toml)
    #[arg(long, global = true, env = "VIDEOCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a script and show its segments and characters
    Parse {
        /// Script file ("Character: dialogue" per line)
        file: Option<PathBuf>,

        /// Read the script from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// List voices offered by the speech service
    Voices {
        /// Speech service API key
        #[arg(long)]
        speech_key: Option<String>,
    },

    /// List language codes with named support
    Languages,

    /// Generate per-line clips and the combined video and audio
    Generate {
        /// Script file
        file: PathBuf,

        /// Voice for a character, NAME=VOICE_ID (repeatable)
        #[arg(long = "voice", value_name = "NAME=ID")]
        voices: Vec<String>,

        /// Portrait for a character, NAME=PATH (repeatable)
        #[arg(long = "image", value_name = "NAME=PATH")]
        images: Vec<String>,

        /// Only generate this line (1-based)
        #[arg(long)]
        segment: Option<usize>,

        /// Language code for every line (default: en)
        #[arg(long)]
        language: Option<String>,

        /// Output directory (default: output.dir from config)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Speech service API key
        #[arg(long)]
        speech_key: Option<String>,

        /// Video service API key
        #[arg(long)]
        video_key: Option<String>,
    },

    /// Concatenate WAV files in order
    ConcatAudio {
        /// Input WAV files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Concatenate video files in order
    ConcatVideo {
        /// Input video files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,

        /// Container: mp4 or y4m (default: output.video_format from config)
        #[arg(long)]
        format: Option<String>,

        /// Output frame rate (default: output.frame_rate from config)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented config template
    Init,
    /// Print the config with secrets redacted
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Parse { file, stdin } => {
            let text = read_script(file.as_deref(), stdin)?;
            let script = script::parse(&text).context("Invalid script")?;
            if json_output {
                json_out::print_json(&json_out::script_value(&script))?;
            } else {
                table::print_script(&script);
            }
        }

        Commands::Voices { speech_key } => {
            let cfg = VideocastConfig::load(config_path)?;
            let speech = speech_client(&cfg, speech_key.as_deref())?;
            let voices = speech
                .list_voices()
                .context("Failed to list voices")?;
            if json_output {
                json_out::print_json(&voices)?;
            } else {
                table::print_voices(&voices);
            }
        }

        Commands::Languages => {
            if json_output {
                let langs: Vec<_> = script::KNOWN_LANGUAGES
                    .iter()
                    .map(|(code, name)| serde_json::json!({ "code": code, "name": name }))
                    .collect();
                json_out::print_json(&langs)?;
            } else {
                table::print_languages();
            }
        }

        Commands::Generate {
            file,
            voices,
            images,
            segment,
            language,
            out,
            speech_key,
            video_key,
        } => {
            let cfg = VideocastConfig::load(config_path)?;
            let request = GenerateRequest {
                file,
                voices,
                images,
                segment,
                language,
                out,
                speech_key,
                video_key,
            };
            generate(&cfg, request, json_output)?;
        }

        Commands::ConcatAudio { files, output } => {
            let inputs = read_all(&files)?;
            let combined = media::concatenate_audio(&inputs).context("Audio concatenation failed")?;
            std::fs::write(&output, &combined)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            let seconds = audio::decode(&combined)?.duration_secs();
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "output": output,
                    "inputs": files.len(),
                    "duration_seconds": seconds,
                    "bytes": combined.len(),
                }))?;
            } else {
                println!(
                    "Combined {} file{} into {} ({}, {})",
                    files.len(),
                    if files.len() == 1 { "" } else { "s" },
                    output.display(),
                    table::format_duration(seconds),
                    table::format_bytes(combined.len() as u64)
                );
            }
        }

        Commands::ConcatVideo {
            files,
            output,
            format,
            fps,
        } => {
            let cfg = VideocastConfig::load(config_path)?;
            let mut settings: VideoSettings = cfg.output.video_settings();
            if let Some(f) = format {
                settings.container = f.parse::<Container>().map_err(anyhow::Error::msg)?;
            }
            if let Some(fps) = fps {
                if fps == 0 {
                    bail!("--fps must be positive");
                }
                settings.frame_rate = fps;
            }

            let inputs = read_all(&files)?;
            let combined =
                media::concatenate_video(&inputs, &settings).context("Video concatenation failed")?;
            std::fs::write(&output, &combined)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "output": output,
                    "inputs": files.len(),
                    "format": settings.container.extension(),
                    "frame_rate": settings.frame_rate,
                    "bytes": combined.len(),
                }))?;
            } else {
                println!(
                    "Combined {} video{} into {} ({})",
                    files.len(),
                    if files.len() == 1 { "" } else { "s" },
                    output.display(),
                    table::format_bytes(combined.len() as u64)
                );
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let (created, path) = config::init_config(config_path)?;
                if created {
                    println!("Wrote config template to {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigAction::Show => {
                let cfg = VideocastConfig::load(config_path)?;
                if json_output {
                    json_out::print_json(&serde_json::json!({
                        "polling": cfg.polling,
                        "output": cfg.output,
                        "speech_configured": cfg.speech.is_some(),
                        "video_configured": cfg.video.is_some(),
                    }))?;
                } else {
                    println!("{}", cfg.display_redacted());
                }
            }
        },
    }

    Ok(())
}

struct GenerateRequest {
    file: PathBuf,
    voices: Vec<String>,
    images: Vec<String>,
    segment: Option<usize>,
    language: Option<String>,
    out: Option<PathBuf>,
    speech_key: Option<String>,
    video_key: Option<String>,
}

fn generate(cfg: &VideocastConfig, req: GenerateRequest, json_output: bool) -> Result<()> {
    let text = read_script(Some(&req.file), false)?;
    let mut script = script::parse(&text).context("Invalid script")?;

    if let Some(ref lang) = req.language {
        if script::language_name(lang).is_none() {
            eprintln!("Note: language \"{lang}\" is not in the known list; passing it through.");
        }
        script.set_language_all(lang);
    }

    let cast = build_cast(&script, &req.voices, &req.images)?;
    for name in cast.unknown_characters(&script) {
        eprintln!("Warning: \"{name}\" does not appear in the script.");
    }
    let incomplete = cast.incomplete_characters(&script);
    if !incomplete.is_empty() {
        eprintln!(
            "Warning: setup incomplete for {}; their lines will be missing.",
            incomplete.join(", ")
        );
    }

    let only = match req.segment {
        Some(0) => bail!("--segment is 1-based"),
        Some(n) if n > script.segments.len() => {
            bail!("--segment {n} is out of range (script has {} lines)", script.segments.len())
        }
        Some(n) => Some(n - 1),
        None => None,
    };

    let speech = speech_client(cfg, req.speech_key.as_deref())?;
    let video = video_client(cfg, req.video_key.as_deref())?;

    let total = script.segments.len();
    let synth = SegmentSynthesizer::new(&speech, &video, cfg.polling).on_stage(|seg, stage| {
        match stage {
            SegmentStage::SpeechDone | SegmentStage::VideoSubmitted | SegmentStage::Pending => {}
            SegmentStage::VideoPolling => {
                eprintln!("[{}/{}] {}: waiting for video...", seg.index + 1, total, seg.character)
            }
            SegmentStage::Complete => eprintln!("[{}/{}] {}: done", seg.index + 1, total, seg.character),
            SegmentStage::Failed => eprintln!("[{}/{}] {}: failed", seg.index + 1, total, seg.character),
        }
    });

    let settings = cfg.output.video_settings();
    let mut coordinator = Coordinator::new(synth, settings.clone());

    let out_dir = req.out.clone().unwrap_or_else(|| cfg.output.dir.clone());
    let writer = OutputWriter::create(&out_dir, run_timestamp(chrono::Utc::now()), settings.container)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    eprintln!(
        "{}",
        table::run_banner(only, total, writer.dir(), cfg.polling.worst_case_wait())
    );

    let outcome = match only {
        Some(index) => coordinator.generate_segment(&script, index, &cast).map(|_| None),
        None => coordinator.run(&script, &cast).map(Some),
    };

    // Segment files are written even when the run failed part way.
    let mut written = write_segments(&writer, &script, &coordinator)?;
    let (missing, error) = match outcome {
        Ok(Some(combined)) => {
            written.extend(writer.write_combined(&combined).context("Failed to write combined media")?);
            (Vec::new(), None)
        }
        Ok(None) => (Vec::new(), None),
        Err(e) => {
            let missing = match &e {
                PipelineError::Incomplete { missing } => missing.clone(),
                _ => missing_segments(&script, &coordinator),
            };
            (missing, Some(e))
        }
    };

    if json_output {
        let message = error.as_ref().map(|e| e.to_string());
        json_out::print_json(&json_out::run_value(&written, &missing, message.as_deref()))?;
    } else {
        table::print_run_report(&written, &missing);
    }

    match error {
        None => Ok(()),
        Some(e) => {
            if let Some(hint) = failure_hint(&e) {
                eprintln!("{hint}");
            }
            Err(e).context("Generation failed")
        }
    }
}

fn write_segments(writer: &OutputWriter, script: &Script, coordinator: &Coordinator) -> Result<Vec<WrittenFile>> {
    let mut written = Vec::new();
    for seg in &script.segments {
        if let Some(media) = coordinator.results().get(seg) {
            let files = writer
                .write_segment(media)
                .with_context(|| format!("Failed to write files for line {}", seg.index + 1))?;
            written.extend(files);
        }
    }
    Ok(written)
}

fn missing_segments(script: &Script, coordinator: &Coordinator) -> Vec<MissingSegment> {
    script
        .segments
        .iter()
        .filter(|s| !coordinator.results().is_current(s))
        .map(|s| MissingSegment {
            index: s.index,
            character: s.character.clone(),
            text: s.text.clone(),
        })
        .collect()
}

fn failure_hint(err: &PipelineError) -> Option<String> {
    let PipelineError::Synthesis { source, .. } = err else {
        return None;
    };
    let hint = match source.category() {
        FailureCategory::Auth => "Check the API keys (flags, env vars or config file).".to_string(),
        FailureCategory::Network => "Check the network connection and try again.".to_string(),
        FailureCategory::Timeout => format!(
            "The video job may still finish; job id: {}",
            source.job_id().unwrap_or("unknown")
        ),
        FailureCategory::Service => return None,
    };
    Some(hint)
}

/// Build the cast from `NAME=VALUE` assignments.
fn build_cast(script: &Script, voices: &[String], images: &[String]) -> Result<Cast> {
    let mut cast = Cast::new();
    for v in voices {
        let (name, id) = split_assignment(v, "--voice")?;
        cast.set_voice(name, id);
    }
    for i in images {
        let (name, path) = split_assignment(i, "--image")?;
        let portrait = Portrait::load(Path::new(path))
            .with_context(|| format!("Failed to read portrait for {name}: {path}"))?;
        cast.set_portrait(name, portrait);
    }
    if voices.is_empty() && images.is_empty() {
        bail!(
            "No voices or portraits given. Characters: {}",
            script.characters().join(", ")
        );
    }
    Ok(cast)
}

fn split_assignment<'a>(arg: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    let (name, value) = arg
        .split_once('=')
        .with_context(|| format!("{flag} expects NAME=VALUE, got: {arg}"))?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        bail!("{flag} expects NAME=VALUE, got: {arg}");
    }
    Ok((name, value))
}

fn speech_client(cfg: &VideocastConfig, flag: Option<&str>) -> Result<ElevenLabsClient> {
    let sc = cfg.speech.clone().unwrap_or_default();
    let key = config::resolve_credential(
        flag,
        SPEECH_KEY_ENV,
        sc.api_key.as_deref(),
        sc.api_key_command.as_deref(),
    )
    .context("Speech service credentials")?;
    Ok(ElevenLabsClient::new(key)?
        .with_base_url(sc.base_url)
        .with_model(sc.model_id)
        .with_sample_rate(sc.sample_rate))
}

fn video_client(cfg: &VideocastConfig, flag: Option<&str>) -> Result<HedraClient> {
    let vc = cfg.video.clone().unwrap_or_default();
    let key = config::resolve_credential(
        flag,
        VIDEO_KEY_ENV,
        vc.api_key.as_deref(),
        vc.api_key_command.as_deref(),
    )
    .context("Video service credentials")?;
    if !hedra::is_valid_key(&key) {
        bail!("Video service API key should start with \"{}\"", hedra::KEY_PREFIX);
    }
    Ok(HedraClient::new(key, vc.base_url)?)
}

fn read_script(file: Option<&Path>, stdin: bool) -> Result<String> {
    if stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read script from stdin")?;
        return Ok(text);
    }
    let Some(path) = file else {
        bail!("No script given. Pass a file or use --stdin.");
    };
    std::fs::read_to_string(path).with_context(|| format!("Failed to read script: {}", path.display()))
}

fn read_all(files: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    files
        .iter()
        .map(|f| std::fs::read(f).with_context(|| format!("Failed to read {}", f.display())))
        .collect()
}
