use crate::{embeds, types::*};
use log::info;
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, CreateChannel, CreateEmbed, CreateMessage, GuildId,
    Mentionable,
};

const CHANNEL_TOPIC: &str = "🎵 Music requests channel. Type a song name or paste a link to play!";

fn welcome_embed() -> CreateEmbed {
    embeds::info(
        "🎵 Music Channel Setup",
        "This channel has been set up for music requests!\n\n\
         **How to use:**\n\
         • Simply type a song name or paste a YouTube link here to play.\n\
         • Use slash commands like `/skip`, `/stop`, `/queue` for control.\n\n\
         Enjoy the tunes! 🎧",
    )
    .color(embeds::SUCCESS)
}

/// Finds the request channel by name, creating it when missing.
/// Returns the channel and whether it was created.
pub async fn ensure_request_channel(
    ctx: &serenity::Context,
    guild_id: GuildId,
    name: &str,
) -> Result<(ChannelId, bool), serenity::Error> {
    let existing = ctx.cache.guild(guild_id).and_then(|guild| {
        guild
            .channels
            .values()
            .find(|channel| channel.kind == ChannelType::Text && channel.name == name)
            .map(|channel| channel.id)
    });
    if let Some(id) = existing {
        return Ok((id, false));
    }

    let channel = guild_id
        .create_channel(
            ctx,
            CreateChannel::new(name)
                .kind(ChannelType::Text)
                .topic(CHANNEL_TOPIC),
        )
        .await?;
    channel
        .id
        .send_message(ctx, CreateMessage::new().embed(welcome_embed()))
        .await?;

    info!("Created request channel #{} in guild {}", name, guild_id);
    Ok((channel.id, true))
}

/// Create the music request channel
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_CHANNELS",
    default_member_permissions = "MANAGE_CHANNELS"
)]
pub async fn setup(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Failed to get guild ID")?;
    ctx.defer().await?;

    let name = &ctx.data().config.channel_name;
    let (channel, created) = ensure_request_channel(ctx.serenity_context(), guild_id, name).await?;

    let message = if created {
        format!("Created {}. Type a song name there to play it!", channel.mention())
    } else {
        format!("Music channel {} already exists.", channel.mention())
    };
    ctx.send(poise::CreateReply::default().embed(embeds::success(message)))
        .await?;
    Ok(())
}
