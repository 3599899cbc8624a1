//! guildtune: a per-guild Discord music player.
//!
//! The [`audio`] core is independent of Discord and is driven through the
//! [`audio::sink::VoiceSink`] and [`audio::sink::NotificationChannel`]
//! traits. [`bot`] wires it to Serenity and Songbird.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
