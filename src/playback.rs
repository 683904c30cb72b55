//! Destinations for synthesized audio.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Receives finished MP3 payloads. `rate` is the playback speed multiplier.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, audio: Vec<u8>, rate: f64);
    fn stop(&self);
}

/// Writes each payload to a fixed path, replacing the previous one.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlaybackSink for FileSink {
    fn play(&self, audio: Vec<u8>, _rate: f64) {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(error = %e, path = %parent.display(), "failed to create output directory");
                    return;
                }
            }
        }
        match fs::write(&self.path, &audio) {
            Ok(()) => info!(path = %self.path.display(), bytes = audio.len(), "wrote audio"),
            Err(e) => warn!(error = %e, path = %self.path.display(), "failed to write audio"),
        }
    }

    fn stop(&self) {}
}

struct Playback {
    child: Child,
    // Deleted when playback is dropped.
    _file: NamedTempFile,
}

/// Plays payloads through an external player.
///
/// The template is split on whitespace; `{file}` and `{rate}` are substituted
/// in each argument, e.g. `mpv --speed={rate} {file}`.
pub struct CommandSink {
    template: String,
    current: Mutex<Option<Playback>>,
}

impl CommandSink {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            current: Mutex::new(None),
        }
    }

    pub fn default_template() -> &'static str {
        if cfg!(target_os = "macos") {
            "afplay -r {rate} {file}"
        } else {
            "mpv --really-quiet --no-video --speed={rate} {file}"
        }
    }

    fn command(&self, file: &Path, rate: f64) -> Option<Command> {
        let file = file.to_string_lossy();
        let rate = rate.to_string();
        let mut parts = self
            .template
            .split_whitespace()
            .map(|part| part.replace("{file}", &file).replace("{rate}", &rate));
        let mut cmd = Command::new(parts.next()?);
        cmd.args(parts);
        Some(cmd)
    }

    fn start(&self, audio: &[u8], rate: f64) -> io::Result<Playback> {
        let mut file = tempfile::Builder::new()
            .prefix("traytalk-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(audio)?;
        file.flush()?;

        let child = self
            .command(file.path(), rate)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty player command"))?
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;
        Ok(Playback { child, _file: file })
    }

    /// Blocks until the current player exits.
    pub fn wait(&self) -> io::Result<()> {
        let playback = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut playback) = playback {
            let status = playback.child.wait()?;
            debug!(%status, "player exited");
        }
        Ok(())
    }
}

impl PlaybackSink for CommandSink {
    fn play(&self, audio: Vec<u8>, rate: f64) {
        self.stop();
        match self.start(&audio, rate) {
            Ok(playback) => {
                debug!(bytes = audio.len(), rate, "playback started");
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(playback);
            }
            Err(e) => warn!(error = %e, template = %self.template, "failed to start player"),
        }
    }

    fn stop(&self) {
        let playback = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut playback) = playback {
            debug!("stopping playback");
            if let Err(e) = playback.child.kill() {
                debug!(error = %e, "player already exited");
            }
            let _ = playback.child.wait();
        }
    }
}
