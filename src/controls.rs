//! Button presses on "Now Playing" messages.

use crate::{
    commands::queue_view,
    components::Control,
    embeds,
    error::MusicError,
    player,
    queue::{MAX_VOLUME, SkipOutcome},
    types::{Data, Error},
    voice,
};
use log::{debug, warn};
use poise::serenity_prelude::{
    self as serenity, ComponentInteraction, CreateActionRow, CreateEmbed,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, EditInteractionResponse, GuildId,
};

const VOLUME_STEP: u8 = 10;

/// What a button press does to the conversation after it is acknowledged.
enum Reply {
    /// Private message to the presser.
    Private(CreateEmbed, Vec<CreateActionRow>),
    /// Redraw the "Now Playing" message in place.
    Refresh,
    /// Strip the buttons and tell the presser why.
    Detach(CreateEmbed),
}

fn step_volume(current: u8, up: bool) -> u8 {
    if up {
        current.saturating_add(VOLUME_STEP).min(MAX_VOLUME)
    } else {
        current.saturating_sub(VOLUME_STEP)
    }
}

async fn apply(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
    control: Control,
) -> Result<Reply, MusicError> {
    let queue = data.queues.get(guild_id).ok_or(MusicError::NothingPlaying)?;

    let reply = match control {
        Control::Previous => {
            let track = player::previous(ctx, data, guild_id).await?;
            Reply::Private(
                embeds::success(format!(
                    "⏮️ Playing previous: **{}**",
                    embeds::truncate(&track.title, 80)
                )),
                Vec::new(),
            )
        }
        Control::PlayPause => {
            if queue.is_paused() {
                player::resume(data, guild_id)?;
            } else {
                player::pause(data, guild_id)?;
            }
            Reply::Refresh
        }
        Control::Skip => match player::skip(ctx, data, guild_id).await? {
            SkipOutcome::Next(track) => Reply::Private(
                embeds::success(format!(
                    "⏭️ Skipped to **{}**",
                    embeds::truncate(&track.title, 80)
                )),
                Vec::new(),
            ),
            SkipOutcome::Exhausted => {
                voice::leave(data, guild_id).await;
                Reply::Detach(embeds::info("Queue", "Queue finished! No more songs to play."))
            }
        },
        Control::Stop => {
            voice::leave(data, guild_id).await;
            Reply::Detach(embeds::success(
                "⏹️ Stopped playback and left the voice channel",
            ))
        }
        Control::Queue => {
            let (embed, _) = queue_view(ctx, &queue, 1)?;
            Reply::Private(embed, Vec::new())
        }
        Control::Loop => {
            data.queues.set_loop_mode(guild_id, queue.loop_mode.cycle())?;
            Reply::Refresh
        }
        Control::Shuffle => {
            data.queues.shuffle(guild_id)?;
            Reply::Private(embeds::success("🔀 Shuffled the queue"), Vec::new())
        }
        Control::VolumeDown | Control::VolumeUp => {
            let volume = step_volume(queue.volume, control == Control::VolumeUp);
            player::set_volume(data, guild_id, volume)?;
            Reply::Refresh
        }
    };
    Ok(reply)
}

async fn reject(
    ctx: &serenity::Context,
    interaction: &ComponentInteraction,
    error: &MusicError,
) -> Result<(), Error> {
    let message = CreateInteractionResponseMessage::new()
        .embed(embeds::error(error.user_message()))
        .ephemeral(true);
    interaction
        .create_response(ctx, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

pub async fn handle(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &ComponentInteraction,
    control: Control,
) -> Result<(), Error> {
    let Some(guild_id) = interaction.guild_id else {
        return reject(ctx, interaction, &MusicError::NotInGuild).await;
    };
    if let Err(e) = voice::validate_listener(ctx, data, guild_id, interaction.user.id, true) {
        return reject(ctx, interaction, &e).await;
    }

    interaction.defer(ctx).await?;
    debug!(
        "Button {} pressed by {} in guild {}",
        control.custom_id(),
        interaction.user.id,
        guild_id
    );

    match apply(ctx, data, guild_id, control).await {
        Ok(Reply::Private(embed, rows)) => {
            let followup = CreateInteractionResponseFollowup::new()
                .embed(embed)
                .components(rows)
                .ephemeral(true);
            interaction.create_followup(ctx, followup).await?;
        }
        Ok(Reply::Refresh) => {
            if let Some((embed, rows)) = player::now_playing_view(data, guild_id) {
                let edit = EditInteractionResponse::new().embed(embed).components(rows);
                interaction.edit_response(ctx, edit).await?;
            }
        }
        Ok(Reply::Detach(embed)) => {
            let edit = EditInteractionResponse::new().components(Vec::new());
            interaction.edit_response(ctx, edit).await?;
            let followup = CreateInteractionResponseFollowup::new()
                .embed(embed)
                .ephemeral(true);
            interaction.create_followup(ctx, followup).await?;
        }
        Err(e) => {
            if !e.is_user_facing() {
                warn!("Button {} failed in guild {}: {}", control.custom_id(), guild_id, e);
            }
            let followup = CreateInteractionResponseFollowup::new()
                .embed(embeds::error(e.user_message()))
                .ephemeral(true);
            interaction.create_followup(ctx, followup).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_steps_are_clamped() {
        assert_eq!(step_volume(50, true), 60);
        assert_eq!(step_volume(50, false), 40);
        assert_eq!(step_volume(195, true), MAX_VOLUME);
        assert_eq!(step_volume(5, false), 0);
        assert_eq!(step_volume(MAX_VOLUME, true), MAX_VOLUME);
    }
}
