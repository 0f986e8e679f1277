//! # Transcode Session
//!
//! Wraps one external transcoder invocation (ffmpeg) into a byte stream the
//! voice connection can consume.
//!
//! Every call to [`TranscodeSession::start`] spawns exactly one subprocess.
//! Seeking, filter changes and skips never reuse a session: the queue stops
//! the old one and starts a fresh one with new arguments.
//!
//! ## Failure detection
//!
//! The subprocess is owned by a reaper task that awaits its exit. A watcher
//! task per session awaits that exit too: a non-zero exit that was not caused
//! by [`TranscodeSession::stop`] is reported as [`PlaybackEvent::Errored`]
//! tagged with the session's [`PlaybackId`], so the owning queue can tell it
//! apart from errors of sessions it already replaced.
//!
//! The queue also asks [`TranscodeSession::exit_status`] when the voice side
//! reports the end of a stream: a pipe that closed because ffmpeg crashed
//! looks exactly like a track that finished.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Read;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

use super::voice::{PlaybackEvent, PlaybackEventSender, PlaybackId, StreamFormat, TranscodedStream};

/// Filtro identidad de ffmpeg
pub const IDENTITY_FILTER: &str = "anull";

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Tiempo que se espera a que ffmpeg salga después de cerrar su salida
pub const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Resultado de un proceso que terminó
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    Failure(String),
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            ProcessExit::Success
        } else {
            ProcessExit::Failure(format!("ffmpeg terminó con {}", status))
        }
    }
}

/// Control sobre el subproceso de transcodificación
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Pide terminar el proceso sin bloquear
    fn kill(&self) -> Result<()>;

    /// Espera a que el proceso termine
    async fn wait(&self) -> ProcessExit;
}

/// Espera el primer estado publicado en `exit`
pub(crate) async fn wait_published(mut exit: watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    let status = match exit.wait_for(Option::is_some).await {
        Ok(status) => status.clone(),
        Err(_) => None,
    };
    status.unwrap_or_else(|| ProcessExit::Failure("el proceso desapareció sin estado".to_string()))
}

/// Proceso de ffmpeg vigilado por su tarea de recogida
struct FfmpegProcess {
    kill: Mutex<Option<oneshot::Sender<()>>>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

#[async_trait]
impl ProcessControl for FfmpegProcess {
    fn kill(&self) -> Result<()> {
        if let Some(kill) = self.kill.lock().take() {
            // La tarea ya terminó si el receptor no existe
            let _ = kill.send(());
        }
        Ok(())
    }

    async fn wait(&self) -> ProcessExit {
        wait_published(self.exit.clone()).await
    }
}

/// Espera la salida del hijo o la orden de terminarlo, y publica el resultado
async fn reap(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exit: watch::Sender<Option<ProcessExit>>,
) {
    // Soltar el emisor sin enviar también cuenta como orden de terminar
    let finished = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill => None,
    };

    let status = match finished {
        Some(Ok(status)) => ProcessExit::from(status),
        Some(Err(e)) => ProcessExit::Failure(format!("No se pudo esperar a ffmpeg: {}", e)),
        None => {
            if let Err(e) = child.kill().await {
                warn!("⚠️ No se pudo terminar ffmpeg: {}", e);
            }
            ProcessExit::Failure("ffmpeg terminado".to_string())
        }
    };

    exit.send_replace(Some(status));
}

/// Proceso recién lanzado: su salida y su control
pub struct TranscodeProcess {
    pub output: Box<dyn Read + Send + Sync>,
    pub control: Arc<dyn ProcessControl>,
}

/// Lanza el transcodificador externo
pub trait Transcoder: Send + Sync {
    fn spawn(&self, args: &[String]) -> Result<TranscodeProcess>;
}

/// Transcodificador basado en el binario de ffmpeg
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn spawn(&self, args: &[String]) -> Result<TranscodeProcess> {
        debug!("🔧 {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        let stdout = child
            .stdout
            .take()
            .context("ffmpeg no expuso stdout")?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(reap(child, kill_rx, exit_tx));

        // songbird lee el stream desde hilos bloqueantes, fuera del runtime
        Ok(TranscodeProcess {
            output: Box::new(SyncIoBridge::new(stdout)),
            control: Arc::new(FfmpegProcess {
                kill: Mutex::new(Some(kill_tx)),
                exit: exit_rx,
            }),
        })
    }
}

/// Parámetros de una sesión
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub source_url: String,
    pub filter: String,
    pub seek: u64,
}

impl TranscodeRequest {
    /// Argumentos de ffmpeg: reconexión, decodificación a 48 kHz estéreo y filtro
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-analyzeduration",
            "0",
            "-loglevel",
            "0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.seek > 0 {
            args.push("-ss".to_string());
            args.push(self.seek.to_string());
        }

        args.push("-i".to_string());
        args.push(self.source_url.clone());

        let filter = if self.filter.trim().is_empty() {
            IDENTITY_FILTER
        } else {
            self.filter.as_str()
        };
        args.push("-af".to_string());
        args.push(filter.to_string());

        args.extend(
            [
                "-ar".to_string(),
                SAMPLE_RATE.to_string(),
                "-ac".to_string(),
                CHANNELS.to_string(),
                "-c:a".to_string(),
                "pcm_s16le".to_string(),
                "-f".to_string(),
                StreamFormat::Wav.extension().to_string(),
                "pipe:1".to_string(),
            ],
        );

        args
    }
}

/// Sesión de transcodificación viva; se detiene al soltarla
pub struct TranscodeSession {
    playback: PlaybackId,
    request: TranscodeRequest,
    control: Arc<dyn ProcessControl>,
    stopped: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

impl TranscodeSession {
    /// Lanza el proceso y devuelve la sesión junto con su stream
    pub fn start(
        transcoder: &dyn Transcoder,
        request: TranscodeRequest,
        playback: PlaybackId,
        events: PlaybackEventSender,
    ) -> Result<(Self, TranscodedStream)> {
        let process = transcoder.spawn(&request.args())?;

        info!(
            "🎚️ Sesión {} iniciada (filtro: {}, seek: {}s)",
            playback, request.filter, request.seek
        );

        let stopped = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_exit(
            playback,
            process.control.clone(),
            stopped.clone(),
            events,
        ));

        let session = Self {
            playback,
            request,
            control: process.control,
            stopped,
            watcher: Some(watcher),
        };
        let stream = TranscodedStream {
            reader: process.output,
            format: StreamFormat::Wav,
        };

        Ok((session, stream))
    }

    pub fn playback(&self) -> PlaybackId {
        self.playback
    }

    pub fn request(&self) -> &TranscodeRequest {
        &self.request
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Estado de salida del proceso, o `None` si sigue vivo tras `grace`
    pub async fn exit_status(&self, grace: Duration) -> Option<ProcessExit> {
        tokio::time::timeout(grace, self.control.wait()).await.ok()
    }

    /// Termina el proceso; llamadas repetidas no hacen nada
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }

        if let Err(e) = self.control.kill() {
            warn!("⚠️ Error al detener la sesión {}: {:#}", self.playback, e);
        }

        debug!("⏹️ Sesión {} detenida", self.playback);
    }
}

impl Drop for TranscodeSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_exit(
    playback: PlaybackId,
    control: Arc<dyn ProcessControl>,
    stopped: Arc<AtomicBool>,
    events: PlaybackEventSender,
) {
    match control.wait().await {
        ProcessExit::Success => {
            debug!("Proceso de la sesión {} terminó correctamente", playback);
        }
        ProcessExit::Failure(message) => {
            if !stopped.load(Ordering::Acquire) {
                warn!("❌ Sesión {} falló: {}", playback, message);
                let _ = events.send(PlaybackEvent::Errored(playback, message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeTranscoder;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn request(seek: u64, filter: &str) -> TranscodeRequest {
        TranscodeRequest {
            source_url: "https://cdn/audio".to_string(),
            filter: filter.to_string(),
            seek,
        }
    }

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_args_without_seek() {
        let args = request(0, "bass=g=10").args();

        assert!(position(&args, "-ss").is_none());
        assert_eq!(args[position(&args, "-af").unwrap() + 1], "bass=g=10");
        assert_eq!(args[position(&args, "-ar").unwrap() + 1], "48000");
        assert_eq!(args[position(&args, "-ac").unwrap() + 1], "2");
        assert_eq!(args[position(&args, "-reconnect").unwrap() + 1], "1");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_seek_goes_before_input() {
        let args = request(42, "anull").args();
        let ss = position(&args, "-ss").unwrap();
        assert_eq!(args[ss + 1], "42");
        assert!(ss < position(&args, "-i").unwrap());
    }

    #[test]
    fn test_blank_filter_uses_identity() {
        let args = request(0, "  ").args();
        assert_eq!(args[position(&args, "-af").unwrap() + 1], IDENTITY_FILTER);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_kills_once() {
        let transcoder = FakeTranscoder::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let (mut session, _stream) =
            TranscodeSession::start(&transcoder, request(0, "anull"), PlaybackId::default(), tx)
                .unwrap();

        session.stop();
        session.stop();
        drop(session);

        assert!(transcoder.process(0).killed());
        assert_eq!(transcoder.process(0).kill_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_is_reported_with_session_id() {
        let transcoder = FakeTranscoder::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = PlaybackId::default().next();

        let (_session, _stream) =
            TranscodeSession::start(&transcoder, request(0, "anull"), id, tx).unwrap();

        transcoder.process(0).exit(ProcessExit::Failure("broken pipe".into()));

        assert_eq!(
            rx.recv().await,
            Some(PlaybackEvent::Errored(id, "broken pipe".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_reports_nothing() {
        let transcoder = FakeTranscoder::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (mut session, _stream) =
            TranscodeSession::start(&transcoder, request(0, "anull"), PlaybackId::default(), tx)
                .unwrap();

        session.stop();
        transcoder.process(0).exit(ProcessExit::Failure("killed".into()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_status_reports_crash() {
        let transcoder = FakeTranscoder::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let (session, _stream) =
            TranscodeSession::start(&transcoder, request(0, "anull"), PlaybackId::default(), tx)
                .unwrap();
        transcoder.process(0).exit(ProcessExit::Failure("exit status: 1".into()));

        assert_eq!(
            session.exit_status(EXIT_GRACE).await,
            Some(ProcessExit::Failure("exit status: 1".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_status_gives_up_on_running_process() {
        let transcoder = FakeTranscoder::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let (session, _stream) =
            TranscodeSession::start(&transcoder, request(0, "anull"), PlaybackId::default(), tx)
                .unwrap();

        assert_eq!(session.exit_status(EXIT_GRACE).await, None);
        assert!(!transcoder.process(0).killed());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_maps_to_failure() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(ProcessExit::from(ExitStatus::from_raw(0)), ProcessExit::Success);
        assert!(matches!(
            ProcessExit::from(ExitStatus::from_raw(1 << 8)),
            ProcessExit::Failure(_)
        ));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let transcoder = FakeTranscoder::new();
        transcoder.fail_next_spawn("ffmpeg not found");
        let (tx, _rx) = mpsc::unbounded_channel();

        let result =
            TranscodeSession::start(&transcoder, request(0, "anull"), PlaybackId::default(), tx);
        assert!(result.is_err());
    }
}
