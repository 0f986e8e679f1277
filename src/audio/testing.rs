//! Hand-written fakes for the stateful collaborators of the queue.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::watch;

use super::transcode::{wait_published, ProcessControl, ProcessExit, TranscodeProcess, Transcoder};
use super::voice::{
    Listeners, PlayOptions, PlaybackEvent, PlaybackEventSender, PlaybackId, Subscription,
    TranscodedStream, VoiceConnection,
};

#[derive(Debug)]
struct FakeProcessState {
    kills: Mutex<usize>,
    exit: watch::Sender<Option<ProcessExit>>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeProcess {
    state: Arc<FakeProcessState>,
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self {
            state: Arc::new(FakeProcessState {
                kills: Mutex::new(0),
                exit: watch::Sender::new(None),
            }),
        }
    }
}

impl FakeProcess {
    pub(crate) fn killed(&self) -> bool {
        self.kill_count() > 0
    }

    pub(crate) fn kill_count(&self) -> usize {
        *self.state.kills.lock()
    }

    /// Simula la salida del proceso con el estado dado
    pub(crate) fn exit(&self, exit: ProcessExit) {
        self.state.exit.send_replace(Some(exit));
    }
}

#[async_trait]
impl ProcessControl for FakeProcess {
    fn kill(&self) -> Result<()> {
        *self.state.kills.lock() += 1;
        self.state.exit.send_if_modified(|exit| {
            if exit.is_some() {
                return false;
            }
            *exit = Some(ProcessExit::Failure("killed".into()));
            true
        });
        Ok(())
    }

    async fn wait(&self) -> ProcessExit {
        wait_published(self.state.exit.subscribe()).await
    }
}

#[derive(Default)]
pub(crate) struct FakeTranscoder {
    spawned: Mutex<Vec<(Vec<String>, FakeProcess)>>,
    fail_next: Mutex<Option<String>>,
}

impl FakeTranscoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn process(&self, index: usize) -> FakeProcess {
        self.spawned.lock()[index].1.clone()
    }

    pub(crate) fn last_process(&self) -> Option<FakeProcess> {
        self.spawned.lock().last().map(|(_, p)| p.clone())
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub(crate) fn args(&self, index: usize) -> Vec<String> {
        self.spawned.lock()[index].0.clone()
    }

    /// Procesos que siguen vivos (no terminados por la sesión)
    pub(crate) fn live_processes(&self) -> usize {
        self.spawned.lock().iter().filter(|(_, p)| !p.killed()).count()
    }

    pub(crate) fn fail_next_spawn(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }
}

impl Transcoder for FakeTranscoder {
    fn spawn(&self, args: &[String]) -> Result<TranscodeProcess> {
        if let Some(message) = self.fail_next.lock().take() {
            anyhow::bail!(message);
        }

        let process = FakeProcess::default();
        self.spawned.lock().push((args.to_vec(), process.clone()));

        Ok(TranscodeProcess {
            output: Box::new(Cursor::new(Vec::<u8>::new())),
            control: Arc::new(process),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConnectionCall {
    Play(PlaybackId),
    Stop,
    Pause,
    Resume,
    SetVolume(f32),
    Disconnect,
}

pub(crate) struct FakeConnection {
    guild_id: GuildId,
    listeners: Listeners,
    calls: Mutex<Vec<ConnectionCall>>,
    fail_next_play: Mutex<Option<String>>,
}

impl FakeConnection {
    pub(crate) fn new(guild_id: GuildId) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            listeners: Listeners::new(),
            calls: Mutex::new(Vec::new()),
            fail_next_play: Mutex::new(None),
        })
    }

    pub(crate) fn calls(&self) -> Vec<ConnectionCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub(crate) fn play_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ConnectionCall::Play(_)))
            .count()
    }

    pub(crate) fn last_playback(&self) -> Option<PlaybackId> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            ConnectionCall::Play(id) => Some(*id),
            _ => None,
        })
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn fail_next_play(&self, message: &str) {
        *self.fail_next_play.lock() = Some(message.to_string());
    }

    /// Simula el fin natural de una reproducción
    pub(crate) fn finish(&self, playback: PlaybackId) {
        self.listeners.notify(PlaybackEvent::Ended(playback));
    }

    pub(crate) fn finish_current(&self) {
        if let Some(playback) = self.last_playback() {
            self.finish(playback);
        }
    }

    pub(crate) fn error_current(&self, message: &str) {
        if let Some(playback) = self.last_playback() {
            self.listeners
                .notify(PlaybackEvent::Errored(playback, message.to_string()));
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn subscribe(&self, events: PlaybackEventSender) -> Subscription {
        self.listeners.add(events)
    }

    fn unsubscribe(&self, subscription: Subscription) {
        self.listeners.remove(subscription);
    }

    async fn play(&self, _stream: TranscodedStream, options: PlayOptions) -> Result<()> {
        if let Some(message) = self.fail_next_play.lock().take() {
            anyhow::bail!(message);
        }
        self.calls.lock().push(ConnectionCall::Play(options.playback));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().push(ConnectionCall::Stop);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.calls.lock().push(ConnectionCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.calls.lock().push(ConnectionCall::Resume);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.calls.lock().push(ConnectionCall::SetVolume(volume));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.calls.lock().push(ConnectionCall::Disconnect);
        Ok(())
    }
}
