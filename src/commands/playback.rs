use super::listener;
use crate::{
    embeds,
    error::MusicError,
    player,
    queue::{LoopMode, SkipOutcome, position_to_index},
    types::*,
    voice,
};

async fn say(ctx: Context<'_>, message: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(embeds::success(message)))
        .await?;
    Ok(())
}

/// Skip the current song
#[poise::command(slash_command, guild_only)]
pub async fn skip(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    ctx.defer().await?;

    match player::skip(ctx.serenity_context(), ctx.data(), guild_id).await? {
        SkipOutcome::Next(track) => {
            say(
                ctx,
                format!("⏭️ Skipped to **{}**", embeds::truncate(&track.title, 80)),
            )
            .await
        }
        SkipOutcome::Exhausted => {
            voice::leave(ctx.data(), guild_id).await;
            say(ctx, "Queue finished! No more songs to play.").await
        }
    }
}

/// Go back to the previous song
#[poise::command(slash_command, guild_only)]
pub async fn previous(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    ctx.defer().await?;

    let track = player::previous(ctx.serenity_context(), ctx.data(), guild_id).await?;
    say(
        ctx,
        format!("⏮️ Playing previous: **{}**", embeds::truncate(&track.title, 80)),
    )
    .await
}

/// Jump to a position in the queue
#[poise::command(slash_command, guild_only)]
pub async fn jump(
    ctx: Context<'_>,
    #[description = "Position in the queue"]
    #[min = 1]
    position: usize,
) -> Result<(), Error> {
    let listener = listener(ctx, true)?;
    let len = listener.queue.map_or(0, |q| q.len());
    let index = position_to_index(position, len)?;
    ctx.defer().await?;

    let track = player::jump(ctx.serenity_context(), ctx.data(), listener.guild_id, index).await?;
    say(
        ctx,
        format!(
            "Jumped to #{}: **{}**",
            position,
            embeds::truncate(&track.title, 80)
        ),
    )
    .await
}

/// Set the loop mode
#[poise::command(slash_command, guild_only, rename = "loop")]
pub async fn loop_mode(
    ctx: Context<'_>,
    #[description = "Loop mode"] mode: LoopMode,
) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    ctx.data().queues.set_loop_mode(guild_id, mode)?;
    say(ctx, format!("🔁 Loop mode: **{}**", mode.describe())).await
}

/// Set the playback volume
#[poise::command(slash_command, guild_only)]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "Volume level (0-200)"]
    #[min = 0]
    #[max = 200]
    level: u8,
) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    player::set_volume(ctx.data(), guild_id, level)?;
    say(ctx, format!("🔊 Volume set to **{level}%**")).await
}

/// Pause playback
#[poise::command(slash_command, guild_only)]
pub async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    player::pause(ctx.data(), guild_id)?;
    say(ctx, "⏸️ Paused playback").await
}

/// Resume playback
#[poise::command(slash_command, guild_only)]
pub async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    player::resume(ctx.data(), guild_id)?;
    say(ctx, "▶️ Resumed playback").await
}

/// Stop playback and leave the voice channel
#[poise::command(slash_command, guild_only)]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    voice::leave(ctx.data(), guild_id).await;
    say(ctx, "⏹️ Stopped playback and left the voice channel").await
}

/// Leave the voice channel
#[poise::command(slash_command, guild_only)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, false)?.guild_id;
    if !voice::leave(ctx.data(), guild_id).await {
        return Err(MusicError::NothingPlaying.into());
    }
    say(ctx, "👋 Left the voice channel").await
}

/// Show the current song
#[poise::command(slash_command, guild_only)]
pub async fn nowplaying(ctx: Context<'_>) -> Result<(), Error> {
    let listener = listener(ctx, true)?;
    if listener.queue.as_ref().is_none_or(|q| q.is_idle()) {
        return Err(MusicError::NothingPlaying.into());
    }
    let guild_id = listener.guild_id;
    let (embed, rows) =
        player::now_playing_view(ctx.data(), guild_id).ok_or(MusicError::NothingPlaying)?;

    ctx.send(poise::CreateReply::default().embed(embed).components(rows))
        .await?;
    Ok(())
}
