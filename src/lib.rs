//! # GuildTune
//!
//! Per-guild Discord music queues: ffmpeg transcoding, yt-dlp search and
//! autoplay recommendations, driven through serenity and songbird.
//!
//! - [`audio`] holds the queue engine and is independent of Discord's gateway
//! - [`bot`] and [`ui`] are the Discord surface
//! - [`sources`] defines the track model and the provider contracts

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
