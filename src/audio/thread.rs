//! Audio thread implementation
//!
//! The rodio output stream is not `Send`, so it lives on a dedicated thread
//! that owns the single playback session. The async side talks to it with
//! `AudioCommand`s and gets answers back over oneshot channels.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::sync::{mpsc, oneshot};

use super::EngineStatus;
use super::output::open_output_stream;

/// Decodable audio kept for the lifetime of a session
#[derive(Clone)]
pub(super) enum SourceData {
    File(PathBuf),
    /// Remote audio fetched into memory
    Memory(Arc<[u8]>),
}

impl std::fmt::Debug for SourceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceData::File(path) => f.debug_tuple("File").field(path).finish(),
            SourceData::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// Commands sent to the audio thread
#[derive(Debug)]
pub(super) enum AudioCommand {
    Load {
        data: SourceData,
        autoplay: bool,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Pause,
    Resume,
    Stop,
    Seek {
        position: Duration,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

pub(super) type AudioCommandSender = mpsc::UnboundedSender<AudioCommand>;
type AudioCommandReceiver = mpsc::UnboundedReceiver<AudioCommand>;

/// The loaded track
struct Session {
    sink: Sink,
    data: SourceData,
    duration: Duration,
}

/// Spawn the audio thread
///
/// Returns once the output device is open, or with the error that
/// prevented opening it. The thread exits when every sender is dropped.
pub(super) fn spawn_audio_thread(
    device_name: Option<String>,
) -> Result<(AudioCommandSender, JoinHandle<()>), String> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    let thread_handle = thread::Builder::new()
        .name("audio-player".to_string())
        .spawn(move || {
            let stream = match open_output_stream(device_name.as_deref()) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    tracing::error!("Failed to open audio output: {}", e);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            audio_thread_main(stream, command_rx);
        })
        .map_err(|e| format!("Failed to spawn audio thread: {}", e))?;

    ready_rx
        .recv()
        .map_err(|_| "Audio thread exited during startup".to_string())??;

    Ok((command_tx, thread_handle))
}

/// Main loop for the audio thread
fn audio_thread_main(stream: OutputStream, mut command_rx: AudioCommandReceiver) {
    tracing::info!("Audio thread started");

    let mut session: Option<Session> = None;

    while let Some(cmd) = command_rx.blocking_recv() {
        match cmd {
            AudioCommand::Load {
                data,
                autoplay,
                reply,
            } => {
                if let Some(old) = session.take() {
                    old.sink.stop();
                }
                let result = open_session(&stream, data, autoplay).map(|new| {
                    tracing::debug!(
                        "Loaded {:?}, duration {:?}, autoplay {}",
                        new.data,
                        new.duration,
                        autoplay
                    );
                    session = Some(new);
                });
                let _ = reply.send(result);
            }
            AudioCommand::Pause => {
                if let Some(s) = &session {
                    s.sink.pause();
                }
            }
            AudioCommand::Resume => {
                if let Some(s) = &session {
                    s.sink.play();
                }
            }
            AudioCommand::Stop => {
                if let Some(old) = session.take() {
                    old.sink.stop();
                    tracing::debug!("Session released");
                }
            }
            AudioCommand::Seek { position } => {
                if let Some(s) = &session
                    && let Err(e) = s.sink.try_seek(position)
                {
                    tracing::warn!("Seek to {:?} failed: {:?}", position, e);
                }
            }
            AudioCommand::Status { reply } => {
                let status = current_status(&stream, &mut session);
                let _ = reply.send(status);
            }
        }
    }

    if let Some(old) = session.take() {
        old.sink.stop();
    }
    tracing::info!("Audio thread stopped");
}

fn decode(data: &SourceData) -> Result<Box<dyn Source + Send>, String> {
    match data {
        SourceData::File(path) => {
            let file = File::open(path).map_err(|e| format!("Failed to open file: {}", e))?;
            let source = Decoder::new(BufReader::new(file))
                .map_err(|e| format!("Failed to decode audio: {}", e))?;
            Ok(Box::new(source))
        }
        SourceData::Memory(bytes) => {
            let source = Decoder::new(Cursor::new(bytes.clone()))
                .map_err(|e| format!("Failed to decode audio: {}", e))?;
            Ok(Box::new(source))
        }
    }
}

fn open_session(stream: &OutputStream, data: SourceData, autoplay: bool) -> Result<Session, String> {
    let source = decode(&data)?;
    let duration = source.total_duration().unwrap_or(Duration::ZERO);

    let sink = Sink::connect_new(stream.mixer());
    if !autoplay {
        sink.pause();
    }
    sink.append(source);

    Ok(Session {
        sink,
        data,
        duration,
    })
}

/// Build the status snapshot, rewinding the session if it just drained
fn current_status(stream: &OutputStream, session: &mut Option<Session>) -> EngineStatus {
    let Some(s) = session.as_ref() else {
        return EngineStatus::default();
    };

    if s.sink.empty() {
        // Natural end: rebuild paused at the start so resume plays again
        let data = s.data.clone();
        let duration_ms = s.duration.as_millis() as u64;
        *session = match open_session(stream, data, false) {
            Ok(rewound) => Some(rewound),
            Err(e) => {
                tracing::warn!("Failed to rewind finished track: {}", e);
                None
            }
        };
        tracing::debug!("Track finished");
        return EngineStatus {
            position_ms: 0,
            duration_ms,
            is_playing: false,
            did_just_finish: true,
        };
    }

    EngineStatus {
        position_ms: s.sink.get_pos().as_millis() as u64,
        duration_ms: s.duration.as_millis() as u64,
        is_playing: !s.sink.is_paused(),
        did_just_finish: false,
    }
}
