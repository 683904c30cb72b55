use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use traytalk::synthesis::AUDIO_ENCODING;
use traytalk::voices::Voice;
use traytalk::{
    ApiConfig, AudioEffect, CommandSink, FilePreferences, FileSink, MemoryPreferences,
    PlaybackSink, PreferenceStore, Preferences, SpeakOutcome, SpeakTicket, SpeechCoordinator,
    StaticToken,
};

#[derive(Parser, Debug)]
#[command(
    name = "traytalk",
    version,
    about = "Speak text through Google Cloud Text-to-Speech"
)]
struct Cli {
    /// Text to speak (use quotes)
    text: Option<String>,

    /// Preferences file (YAML or JSON)
    #[arg(long = "prefs", value_name = "FILE")]
    prefs: Option<PathBuf>,

    /// Service account key file, overrides stored credentials
    #[arg(long = "credentials", value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Voice name (e.g. en-US-Standard-A)
    #[arg(short = 'v', long = "voice")]
    voice: Option<String>,

    /// BCP-47 language code (e.g. en-US)
    #[arg(short = 'l', long = "language")]
    language: Option<String>,

    /// Playback speed multiplier, applied by the player
    #[arg(long = "speed")]
    speed: Option<f64>,

    /// Pitch in semitones (-20.0–20.0)
    #[arg(long = "pitch", allow_negative_numbers = true)]
    pitch: Option<f64>,

    /// Audio effects profile
    #[arg(long = "effect", value_enum)]
    effect: Option<AudioEffect>,

    /// Persist the overrides above to the preferences file
    #[arg(long = "save", action = ArgAction::SetTrue)]
    save: bool,

    /// Write MP3 audio to this file instead of playing it
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Player command; {file} and {rate} are substituted
    #[arg(long = "player")]
    player: Option<String>,

    /// List available voices and exit
    #[arg(long = "list-voices", action = ArgAction::SetTrue)]
    list_voices: bool,

    /// Emit JSON for --list-voices
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json_output: bool,

    /// Speak each line read from stdin, interrupting the previous one
    #[arg(long = "listen", action = ArgAction::SetTrue)]
    listen: bool,

    /// Request timeout in milliseconds
    #[arg(long = "timeout", default_value_t = 30_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();

    if let Some(output) = &args.output {
        validate_output_extension(output)?;
    }

    let store = args
        .prefs
        .clone()
        .or_else(FilePreferences::default_path)
        .map(FilePreferences::new);
    let mut prefs = store.as_ref().map(|s| s.load()).unwrap_or_default();
    apply_overrides(&mut prefs, &args)?;
    if args.save {
        let store = store.as_ref().context("no preferences path available")?;
        store
            .save(&prefs)
            .with_context(|| format!("failed to save {}", store.path().display()))?;
        info!(path = %store.path().display(), "saved preferences");
    }

    let (sink, player): (Arc<dyn PlaybackSink>, Option<Arc<CommandSink>>) = match &args.output {
        Some(output) => (Arc::new(FileSink::new(output)), None),
        None => {
            let template = args
                .player
                .clone()
                .unwrap_or_else(|| CommandSink::default_template().to_string());
            let player = Arc::new(CommandSink::new(template));
            (player.clone(), Some(player))
        }
    };

    let config = ApiConfig::from_env().with_timeout(Duration::from_millis(args.timeout_ms));
    let mut builder =
        SpeechCoordinator::builder(Arc::new(MemoryPreferences::new(prefs)), sink)
            .config(config);
    if let Some(token) = StaticToken::from_env() {
        builder = builder.token_source(Arc::new(token));
    }
    let coordinator = builder.build();

    if args.list_voices {
        let voices = coordinator.voices(args.language.as_deref()).await;
        print_voices(&voices, args.json_output)?;
        return Ok(());
    }

    let ticket = if args.listen {
        listen(&coordinator).await?
    } else {
        let text = args
            .text
            .as_deref()
            .context("text is required unless --list-voices or --listen is used")?;
        Some(coordinator.speak(text))
    };

    if let Some(ticket) = ticket {
        report(ticket).await?;
    }
    if let Some(output) = &args.output {
        println!("Wrote {}", output.display());
    }
    if let Some(player) = player {
        tokio::task::spawn_blocking(move || player.wait())
            .await?
            .context("player failed")?;
    }
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traytalk=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn apply_overrides(prefs: &mut Preferences, args: &Cli) -> Result<()> {
    if let Some(path) = &args.credentials {
        prefs.credentials = fs::read_to_string(path)
            .with_context(|| format!("failed to read service account key: {}", path.display()))?;
    }
    if let Some(voice) = &args.voice {
        prefs.voice_name = voice.clone();
    }
    if let Some(language) = &args.language {
        prefs.language = language.clone();
    }
    if let Some(speed) = args.speed {
        prefs.speaking_speed = speed;
    }
    if let Some(pitch) = args.pitch {
        prefs.pitch = pitch;
    }
    if let Some(effect) = args.effect {
        prefs.effect = effect;
    }
    // Voice names start with their language code (en-US-Standard-A).
    if prefs.language.is_empty() {
        prefs.language = prefs
            .voice_name
            .splitn(3, '-')
            .take(2)
            .collect::<Vec<_>>()
            .join("-");
    }
    Ok(())
}

/// Speaks every non-empty stdin line; returns the ticket of the last one.
async fn listen(coordinator: &SpeechCoordinator) -> Result<Option<SpeakTicket>> {
    let mut states = coordinator.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            info!(?state, "request state");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = None;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            last = Some(coordinator.speak(line));
        }
    }
    Ok(last)
}

async fn report(ticket: SpeakTicket) -> Result<()> {
    match ticket.wait().await {
        SpeakOutcome::Completed { bytes } => {
            info!(bytes, "speech delivered");
            Ok(())
        }
        SpeakOutcome::Skipped => anyhow::bail!(
            "no voice selected; pass --voice or set voiceName in the preferences file"
        ),
        SpeakOutcome::Failed(status) => anyhow::bail!("{status}"),
        SpeakOutcome::Cancelled => anyhow::bail!("request was cancelled"),
    }
}

fn print_voices(voices: &[Voice], json_output: bool) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "voices": voices }))?
        );
        return Ok(());
    }
    for v in voices {
        let langs = if v.language_codes.is_empty() {
            String::from("-")
        } else {
            v.language_codes.join(",")
        };
        println!(
            "{:<28} {:<11} {:>6} Hz  [{}]",
            v.name,
            v.gender.as_str(),
            v.native_sample_rate_hz,
            langs
        );
    }
    Ok(())
}

fn validate_output_extension(output: &Path) -> Result<()> {
    match output
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
    {
        Some(ref ext) if ext == "mp3" => Ok(()),
        Some(ext) => anyhow::bail!(
            "output extension .{} does not match encoding {} (expected .mp3)",
            ext,
            AUDIO_ENCODING
        ),
        None => anyhow::bail!("output must have .mp3 extension for encoding {AUDIO_ENCODING}"),
    }
}
