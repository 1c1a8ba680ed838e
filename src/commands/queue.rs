use super::listener;
use crate::{
    components, embeds,
    error::MusicError,
    queue::{GuildQueue, position_to_index, total_pages},
    types::*,
};
use poise::serenity_prelude::{
    self as serenity, CreateActionRow, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage,
};
use std::time::Duration;

const PAGINATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Embed for one queue page, plus page buttons when there is more than one.
pub fn queue_view(
    ctx: &serenity::Context,
    queue: &GuildQueue,
    page: usize,
) -> Result<(CreateEmbed, Vec<CreateActionRow>), MusicError> {
    let range = queue.page_range(page)?;
    let guild_name = ctx
        .cache
        .guild(queue.guild_id)
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "this server".to_string());

    let pages = total_pages(queue.len());
    let rows = if pages > 1 {
        vec![components::pagination_row(page, pages)]
    } else {
        Vec::new()
    };

    Ok((embeds::queue_page(queue, page, range, &guild_name), rows))
}

/// Show the queue
#[poise::command(slash_command, guild_only)]
pub async fn queue(
    ctx: Context<'_>,
    #[description = "Page number"]
    #[min = 1]
    page: Option<usize>,
) -> Result<(), Error> {
    let listener = listener(ctx, true)?;
    let guild_id = listener.guild_id;
    let queue = listener.queue.ok_or(MusicError::NothingPlaying)?;
    let mut page = page.unwrap_or(1);

    let (embed, rows) = queue_view(ctx.serenity_context(), &queue, page)?;
    let paginated = !rows.is_empty();
    let handle = ctx
        .send(poise::CreateReply::default().embed(embed).components(rows))
        .await?;
    if !paginated {
        return Ok(());
    }

    let message = handle.message().await?;
    while let Some(press) = message
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(PAGINATION_TIMEOUT)
        .await
    {
        let Some(target) = components::parse_page(&press.data.custom_id) else {
            continue;
        };
        let Some(queue) = ctx.data().queues.get(guild_id) else {
            break;
        };
        page = target.clamp(1, total_pages(queue.len()));

        let (embed, rows) = queue_view(ctx.serenity_context(), &queue, page)?;
        let update = CreateInteractionResponseMessage::new()
            .embed(embed)
            .components(rows);
        press
            .create_response(
                ctx.serenity_context(),
                CreateInteractionResponse::UpdateMessage(update),
            )
            .await?;
    }

    if let Some(queue) = ctx.data().queues.get(guild_id) {
        let page = page.clamp(1, total_pages(queue.len()));
        let (embed, _) = queue_view(ctx.serenity_context(), &queue, page)?;
        handle
            .edit(
                ctx,
                poise::CreateReply::default().embed(embed).components(Vec::new()),
            )
            .await?;
    }
    Ok(())
}

/// Remove a song from the queue
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Position of the song to remove"]
    #[min = 1]
    position: usize,
) -> Result<(), Error> {
    let listener = listener(ctx, true)?;
    let len = listener.queue.map_or(0, |q| q.len());
    let index = position_to_index(position, len)?;

    let removed = ctx.data().queues.remove_track(listener.guild_id, index)?;
    ctx.send(poise::CreateReply::default().embed(embeds::success(format!(
        "🗑️ Removed **{}** from the queue",
        embeds::truncate(&removed.title, 80)
    ))))
    .await?;
    Ok(())
}

/// Clear the queue, keeping the current song
#[poise::command(slash_command, guild_only)]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    ctx.data().queues.clear(guild_id)?;
    ctx.send(poise::CreateReply::default().embed(embeds::success("🧹 Cleared the queue")))
        .await?;
    Ok(())
}

/// Shuffle the queue
#[poise::command(slash_command, guild_only)]
pub async fn shuffle(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = listener(ctx, true)?.guild_id;
    ctx.data().queues.shuffle(guild_id)?;
    ctx.send(poise::CreateReply::default().embed(embeds::success("🔀 Shuffled the queue")))
        .await?;
    Ok(())
}
