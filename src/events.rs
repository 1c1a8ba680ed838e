use crate::{
    commands::ensure_request_channel,
    components::{self, Control},
    controls, embeds,
    queue::Requester,
    request::{self, Outcome, PlayTarget},
    types::{Data, Error},
    voice,
};
use log::{debug, error, info, warn};
use poise::serenity_prelude::{
    self as serenity, ActivityData, CreateEmbed, CreateMessage, FullEvent, GuildId, Interaction,
    Message,
};
use std::time::Instant;

pub async fn handle(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!(
                "Logged in as {} in {} guilds",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
            ctx.set_activity(Some(ActivityData::listening("/play to start")));
        }
        FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                info!("Joined guild {} ({})", guild.name, guild.id);
                if let Err(e) =
                    ensure_request_channel(ctx, guild.id, &data.config.channel_name).await
                {
                    warn!("Could not set up request channel in guild {}: {}", guild.id, e);
                }
            }
        }
        FullEvent::Message { new_message } => {
            on_message(ctx, data, new_message).await;
        }
        FullEvent::VoiceStateUpdate { old, new } => {
            voice::on_voice_state_update(ctx, data, old.as_ref(), new).await;
        }
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } => {
            if let Some(control) = Control::from_custom_id(&component.data.custom_id) {
                controls::handle(ctx, data, component, control).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_request_channel(ctx: &serenity::Context, data: &Data, guild_id: GuildId, msg: &Message) -> bool {
    ctx.cache.guild(guild_id).is_some_and(|guild| {
        guild
            .channels
            .get(&msg.channel_id)
            .is_some_and(|channel| channel.name == data.config.channel_name)
    })
}

async fn reply(ctx: &serenity::Context, msg: &Message, embed: CreateEmbed) -> Option<Message> {
    let message = CreateMessage::new().embed(embed).reference_message(msg);
    match msg.channel_id.send_message(ctx, message).await {
        Ok(sent) => Some(sent),
        Err(e) => {
            warn!("Failed to reply in channel {}: {}", msg.channel_id, e);
            None
        }
    }
}

/// Treats plain messages in the request channel as `/play`.
async fn on_message(ctx: &serenity::Context, data: &Data, msg: &Message) {
    if msg.author.bot {
        return;
    }
    let Some(guild_id) = msg.guild_id else {
        return;
    };
    if !is_request_channel(ctx, data, guild_id, msg) {
        return;
    }

    let query = msg.content.trim();
    let attachment = msg.attachments.first().filter(|_| query.is_empty());
    if query.is_empty() && attachment.is_none() {
        return;
    }

    if !data.cooldowns.try_acquire(msg.author.id, Instant::now()) {
        if let Err(e) = msg.react(ctx, '⏳').await {
            debug!("Failed to react to message {}: {}", msg.id, e);
        }
        return;
    }

    let listener = match voice::validate_listener(ctx, data, guild_id, msg.author.id, false) {
        Ok(listener) => listener,
        Err(e) => {
            reply(ctx, msg, embeds::error(e.user_message())).await;
            return;
        }
    };

    let target = PlayTarget {
        guild_id,
        text_channel: msg.channel_id,
        voice_channel: listener.channel,
    };
    let requester = Requester::from(&msg.author);
    let query = Some(query).filter(|q| !q.is_empty());

    let outcome = request::play_query(ctx, data, &target, requester.clone(), query, attachment).await;
    match outcome {
        Ok(Outcome::Enqueued(enqueued)) => {
            reply(ctx, msg, enqueued.embed()).await;
        }
        Ok(Outcome::Choose(candidates)) => {
            let message = CreateMessage::new()
                .embed(embeds::search_results(&candidates, query.unwrap_or_default()))
                .components(vec![components::search_menu(&candidates)])
                .reference_message(msg);
            let menu = match msg.channel_id.send_message(ctx, message).await {
                Ok(menu) => menu,
                Err(e) => {
                    warn!("Failed to send search results in guild {}: {}", guild_id, e);
                    return;
                }
            };

            let (ctx, data) = (ctx.clone(), data.clone());
            tokio::spawn(async move {
                request::await_selection(&ctx, &data, target, requester, menu, candidates).await;
            });
        }
        Err(e) => {
            if !e.is_user_facing() {
                error!("Request channel play failed in guild {}: {}", guild_id, e);
            }
            reply(ctx, msg, embeds::error(e.user_message())).await;
        }
    }
}
