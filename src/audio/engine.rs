use anyhow::{anyhow, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    mpsc::{self, Sender},
    Mutex, PoisonError,
};
use std::thread;

use super::{AlertChannel, AudioBackend};
use crate::error::ScanError;

enum AudioCommand {
    Play {
        channel: AlertChannel,
        path: PathBuf,
        reply: Sender<Result<(), String>>,
    },
    Stop {
        channel: AlertChannel,
    },
}

/// `rodio` playback on a dedicated thread. The output stream is not `Send`,
/// so it and both channel sinks live on that thread and are driven by
/// commands.
pub struct RodioEngine {
    tx: Mutex<Option<Sender<AudioCommand>>>,
}

impl RodioEngine {
    pub fn new() -> Self {
        Self { tx: Mutex::new(None) }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("alert-audio".to_string())
            .spawn(move || {
                let mut stream: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut monitor: Option<Sink> = None;
                let mut countdown: Option<Sink> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play { channel, path, reply } => {
                            let slot = match channel {
                                AlertChannel::Monitor => &mut monitor,
                                AlertChannel::Countdown => &mut countdown,
                            };
                            if let Some(old) = slot.take() {
                                old.stop();
                            }
                            let result = start_looping(&mut stream, &path).map(|sink| {
                                *slot = Some(sink);
                            });
                            let _ = reply.send(result);
                        }
                        AudioCommand::Stop { channel } => {
                            let slot = match channel {
                                AlertChannel::Monitor => &mut monitor,
                                AlertChannel::Countdown => &mut countdown,
                            };
                            if let Some(old) = slot.take() {
                                old.stop();
                            }
                        }
                    }

                    // Hand the device back once nothing is sounding.
                    if monitor.is_none() && countdown.is_none() {
                        stream = None;
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl Default for RodioEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn start_looping(
    stream: &mut Option<(OutputStream, OutputStreamHandle)>,
    path: &Path,
) -> Result<Sink, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| format!("cannot decode {}: {e}", path.display()))?;

    if stream.is_none() {
        let opened = OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio output stream: {e}"))?;
        *stream = Some(opened);
    }
    let Some((_, handle)) = stream.as_ref() else {
        return Err("audio output stream unavailable".into());
    };
    let sink =
        Sink::try_new(handle).map_err(|e| format!("Failed to create audio sink: {e}"))?;
    sink.set_volume(1.0);
    sink.append(source.repeat_infinite());
    sink.play();
    Ok(sink)
}

impl AudioBackend for RodioEngine {
    fn play_looping(&self, channel: AlertChannel, path: &Path) -> Result<()> {
        let tx = self.ensure_thread()?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(AudioCommand::Play {
            channel,
            path: path.to_path_buf(),
            reply: reply_tx,
        })
        .map_err(|e| anyhow!("audio thread gone: {e}"))?;

        reply_rx
            .recv()
            .map_err(|e| anyhow!("audio thread dropped reply: {e}"))?
            .map_err(|msg| ScanError::Playback(msg).into())
    }

    fn stop(&self, channel: AlertChannel) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            tx.send(AudioCommand::Stop { channel })
                .map_err(|e| anyhow!("audio thread gone: {e}"))?;
        }
        Ok(())
    }
}
