use crate::{
    embeds,
    types::{Data, Error},
};
use log::{error, warn};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    #[error("No active queue found")]
    NoQueue,
    #[error("Queue is full (maximum {max} songs)")]
    QueueFull { max: usize },
    #[error("Invalid song index")]
    InvalidIndex,
    #[error("Cannot remove currently playing song. Use skip instead.")]
    CannotRemoveCurrent,
    #[error("Not enough songs to shuffle")]
    NotEnoughTracks,
    #[error("Cannot go back further")]
    NoPreviousTrack,
    #[error("Volume must be between 0 and 200")]
    VolumeOutOfRange,
    #[error("Nothing is currently playing")]
    NothingPlaying,
    #[error("Playback is already paused")]
    AlreadyPaused,
    #[error("Playback is already active")]
    AlreadyPlaying,
    #[error("This command can only be used in a server")]
    NotInGuild,
    #[error("You need to be in a voice channel to use this command")]
    NotInVoiceChannel,
    #[error("You need to be in the same voice channel as the bot")]
    WrongVoiceChannel,
    #[error("I need permission to {0}")]
    MissingVoicePermission(&'static str),
    #[error("Voice channel is full")]
    VoiceChannelFull,
    #[error("Please provide a song name, a YouTube URL or an audio file")]
    MissingQuery,
    #[error("Invalid position. Must be between 1 and {max}")]
    InvalidPosition { max: usize },
    #[error("Invalid page number. Maximum is {max}")]
    InvalidPage { max: usize },
    #[error("No results found")]
    NoResults,
    #[error("{0}")]
    InvalidFile(String),
    #[error("File too large. Maximum size: {max_mb}MB")]
    FileTooLarge { max_mb: u64 },
    #[error("Playback failed: {0}")]
    Playback(String),
    #[error("Voice connection failed: {0}")]
    VoiceConnection(String),
}

impl MusicError {
    /// Validation failures the user can fix themselves, as opposed to backend failures.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Playback(_) | Self::VoiceConnection(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Playback(_) => "Failed to play the song. Please try again.".to_string(),
            Self::VoiceConnection(_) => {
                "Voice connection error. Please try rejoining the voice channel.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Text shown to a user for any error raised while serving them.
pub fn describe(err: &Error) -> String {
    match err.downcast_ref::<MusicError>() {
        Some(music) => music.user_message(),
        None => "An unexpected error occurred. Please try again.".to_string(),
    }
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error: err, ctx, .. } => {
            let guild = ctx
                .guild_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "DM".to_string());

            match err.downcast_ref::<MusicError>() {
                Some(music) if music.is_user_facing() => warn!(
                    "Command /{} rejected for user {} in guild {}: {}",
                    ctx.command().qualified_name,
                    ctx.author().id,
                    guild,
                    music
                ),
                _ => error!(
                    "Command /{} failed for user {} in guild {}: {}",
                    ctx.command().qualified_name,
                    ctx.author().id,
                    guild,
                    err
                ),
            }

            let reply = poise::CreateReply::default()
                .embed(embeds::error(&describe(&err)))
                .ephemeral(true);

            if let Err(e) = ctx.send(reply).await {
                error!("Failed to send error message to user: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling framework error: {}", e);
            }
        }
    }
}
