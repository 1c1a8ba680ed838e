use super::listener;
use crate::{
    components, embeds,
    queue::Requester,
    request::{self, Outcome, PlayTarget},
    types::*,
};
use poise::serenity_prelude as serenity;

/// Play a song from YouTube or an uploaded audio file
#[poise::command(slash_command, guild_only)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name or YouTube URL"] query: Option<String>,
    #[description = "Audio file to play"] file: Option<serenity::Attachment>,
) -> Result<(), Error> {
    let listener = listener(ctx, false)?;
    ctx.defer().await?;

    let target = PlayTarget {
        guild_id: listener.guild_id,
        text_channel: ctx.channel_id(),
        voice_channel: listener.channel,
    };
    let requester = Requester::from(ctx.author());

    let outcome = request::play_query(
        ctx.serenity_context(),
        ctx.data(),
        &target,
        requester.clone(),
        query.as_deref(),
        file.as_ref(),
    )
    .await?;

    match outcome {
        Outcome::Enqueued(enqueued) => {
            ctx.send(poise::CreateReply::default().embed(enqueued.embed()))
                .await?;
        }
        Outcome::Choose(candidates) => {
            let reply = poise::CreateReply::default()
                .embed(embeds::search_results(
                    &candidates,
                    query.as_deref().unwrap_or_default(),
                ))
                .components(vec![components::search_menu(&candidates)]);
            let message = ctx.send(reply).await?.into_message().await?;

            request::await_selection(
                ctx.serenity_context(),
                ctx.data(),
                target,
                requester,
                message,
                candidates,
            )
            .await;
        }
    }

    Ok(())
}
