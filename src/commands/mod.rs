use crate::{
    error::MusicError,
    types::{Context, Data, Error},
    voice::{self, Listener},
};
use log::info;

mod play;
mod playback;
mod queue;
mod setup;

pub use queue::queue_view;
pub use setup::ensure_request_channel;

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        play::play(),
        playback::skip(),
        playback::previous(),
        playback::jump(),
        queue::queue(),
        queue::remove(),
        queue::clear(),
        queue::shuffle(),
        playback::loop_mode(),
        playback::volume(),
        playback::pause(),
        playback::resume(),
        playback::stop(),
        playback::leave(),
        playback::nowplaying(),
        setup::setup(),
    ]
}

/// Runs the voice checks for the invoking user.
fn listener(ctx: Context<'_>, require_queue: bool) -> Result<Listener, MusicError> {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    voice::validate_listener(
        ctx.serenity_context(),
        ctx.data(),
        guild_id,
        ctx.author().id,
        require_queue,
    )
}

pub async fn post_command(ctx: Context<'_>) {
    info!(
        "Command /{} succeeded for user {} in guild {}",
        ctx.command().qualified_name,
        ctx.author().id,
        ctx.guild_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "DM".to_string())
    );
}
