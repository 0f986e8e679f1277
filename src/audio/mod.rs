//! # Audio Module
//!
//! Per-guild playback queues for GuildTune.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! ### [`queue`] - Track List
//! - Ordered tracks plus a cursor pointing at "now playing"
//! - Wrap-around skip, shuffle that keeps the front track, play history
//!
//! ### [`transcode`] - Transcode Session
//! - One ffmpeg subprocess per session, decoding to 48 kHz stereo PCM
//! - Idempotent stop, crash detection through the exit status
//!
//! ### [`autoplay`] - Autoplay Resolver
//! - Lookahead buffer of recommended tracks, refilled through search
//! - Skips anything already played
//!
//! ### [`player`] - Guild Queue
//! - The state machine: `Init → Playing ⇄ Paused → Destroyed`
//! - Repeat policies (`None`, `Track`, `Queue`, `Autoplay`)
//! - Operator commands: skip, seek, volume, filter, state, shuffle, lyrics
//!
//! ### [`registry`] - Queue Registry
//! - One queue per guild, keyed by guild id
//! - Outbound [`registry::QueueEvent`] broadcast
//!
//! ### [`voice`] - Voice connection contract
//! - [`voice::VoiceConnection`] is implemented by the Discord layer
//!   (`bot::voice::SongbirdConnection`) and by test fakes
//!
//! ### [`filters`] - Filter presets
//! - Named ffmpeg filter graphs for `/filter`
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels)
//! - **Container**: WAV over ffmpeg's stdout, decoded by Symphonia inside songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use guildtune::audio::{player::SkipDirection, registry::QueueRegistry, voice::VoiceConnection};
//! # use serenity::all::UserId;
//! # async fn example(registry: QueueRegistry, connection: Arc<dyn VoiceConnection>) -> anyhow::Result<()> {
//! let queue = registry.create(connection, None);
//! let tracks = registry
//!     .search("daft punk", guildtune::sources::SearchKind::Track, Some(1))
//!     .await?
//!     .into_tracks();
//!
//! queue.add_tracks(UserId::new(1), tracks).await?;
//! queue.play().await?;
//! queue.skip(SkipDirection::Next).await?;
//! # Ok(())
//! # }
//! ```

pub mod autoplay;
pub mod filters;
pub mod player;
pub mod queue;
pub mod registry;
pub mod transcode;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
