//! Voice connection lifecycle: joining, leaving, and the automatic
//! disconnects (inactivity, empty channel, lost connection).

use crate::{
    embeds,
    error::MusicError,
    player,
    queue::GuildQueue,
    session::Timer,
    types::Data,
};
use log::{debug, info, warn};
use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Permissions, UserId, VoiceState, async_trait,
};
use songbird::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

pub const ALONE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const RECONNECT_GRACE: Duration = Duration::from_secs(5);

/// A user who passed the voice checks for a music action.
pub struct Listener {
    pub guild_id: GuildId,
    pub channel: ChannelId,
    pub queue: Option<GuildQueue>,
}

pub async fn join(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<(), MusicError> {
    let call = data
        .songbird
        .join(guild_id, channel_id)
        .await
        .map_err(|e| MusicError::VoiceConnection(e.to_string()))?;

    {
        let mut handler = call.lock().await;
        if let Err(e) = handler.deafen(true).await {
            warn!("Failed to self-deafen in guild {}: {}", guild_id, e);
        }
        handler.remove_all_global_events();
        handler.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectWatcher {
                ctx: ctx.clone(),
                data: data.clone(),
                guild_id,
                reconnecting: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    cancel_inactivity_timer(data, guild_id);
    info!("Joined voice channel {} in guild {}", channel_id, guild_id);
    Ok(())
}

/// Stops playback, disconnects and forgets the guild's queue.
pub async fn leave(data: &Data, guild_id: GuildId) -> bool {
    player::halt(data, guild_id);

    let connected = data.songbird.get(guild_id).is_some();
    if connected {
        if let Err(e) = data.songbird.remove(guild_id).await {
            debug!("Voice teardown in guild {}: {}", guild_id, e);
        }
    }

    let had_queue = data.queues.delete(guild_id);
    data.sessions.remove(guild_id);

    if connected || had_queue {
        info!("Left voice in guild {}", guild_id);
    }
    connected || had_queue
}

/// Posts `message` to the queue's text channel, then leaves.
async fn leave_with_notice(ctx: &serenity::Context, data: &Data, guild_id: GuildId, message: &str) {
    player::notify(ctx, data, guild_id, embeds::info("Disconnected", message)).await;
    leave(data, guild_id).await;
}

pub fn start_inactivity_timer(ctx: &serenity::Context, data: &Data, guild_id: GuildId) {
    let timeout = data.config.inactivity_timeout;
    let (ctx, task_data) = (ctx.clone(), data.clone());

    let task = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        let idle = task_data.queues.get(guild_id).is_none_or(|q| !q.playing);
        if idle {
            task_data.sessions.detach_timer(guild_id, Timer::Inactivity);
            info!("Leaving guild {} after {}s of inactivity", guild_id, timeout.as_secs());
            leave_with_notice(
                &ctx,
                &task_data,
                guild_id,
                "Left the voice channel due to inactivity.",
            )
            .await;
        }
    });

    data.sessions.set_timer(guild_id, Timer::Inactivity, task);
    debug!("Inactivity timer started for guild {}", guild_id);
}

pub fn cancel_inactivity_timer(data: &Data, guild_id: GuildId) {
    if data.sessions.cancel_timer(guild_id, Timer::Inactivity) {
        debug!("Inactivity timer cancelled for guild {}", guild_id);
    }
}

fn start_alone_timer(ctx: &serenity::Context, data: &Data, guild_id: GuildId, channel: ChannelId) {
    let (ctx, task_data) = (ctx.clone(), data.clone());

    let task = tokio::spawn(async move {
        tokio::time::sleep(ALONE_TIMEOUT).await;

        if listeners_in(&ctx, guild_id, channel) == 0 && task_data.queues.contains(guild_id) {
            task_data.sessions.detach_timer(guild_id, Timer::Alone);
            info!("Leaving guild {}: alone in channel {}", guild_id, channel);
            leave_with_notice(
                &ctx,
                &task_data,
                guild_id,
                "Left the voice channel - everyone left!",
            )
            .await;
        }
    });

    data.sessions.set_timer(guild_id, Timer::Alone, task);
    info!("Alone in voice channel in guild {}, disconnect timer started", guild_id);
}

/// Counts human members connected to `channel`.
pub fn count_listeners(
    states: impl IntoIterator<Item = (Option<ChannelId>, UserId, bool)>,
    channel: ChannelId,
    bot_id: UserId,
) -> usize {
    states
        .into_iter()
        .filter(|(state_channel, user, is_bot)| {
            *state_channel == Some(channel) && *user != bot_id && !is_bot
        })
        .count()
}

pub fn listeners_in(ctx: &serenity::Context, guild_id: GuildId, channel: ChannelId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    ctx.cache
        .guild(guild_id)
        .map(|guild| {
            count_listeners(
                guild.voice_states.values().map(|state| {
                    let is_bot = state.member.as_ref().is_some_and(|m| m.user.bot);
                    (state.channel_id, state.user_id, is_bot)
                }),
                channel,
                bot_id,
            )
        })
        .unwrap_or(0)
}

pub fn user_voice_channel(
    ctx: &serenity::Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)?
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

pub fn is_full(user_limit: Option<u32>, occupants: usize) -> bool {
    user_limit.is_some_and(|limit| limit > 0 && occupants >= limit as usize)
}

/// The bot must be able to connect and speak, and the channel must have room.
pub fn check_voice_permissions(
    ctx: &serenity::Context,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<(), MusicError> {
    let bot_id = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id).ok_or(MusicError::NotInGuild)?;
    let channel = guild
        .channels
        .get(&channel_id)
        .ok_or(MusicError::NotInVoiceChannel)?;

    match guild.members.get(&bot_id) {
        Some(me) => {
            let permissions = guild.user_permissions_in(channel, me);
            if !permissions.contains(Permissions::CONNECT) {
                return Err(MusicError::MissingVoicePermission(
                    "connect to the voice channel",
                ));
            }
            if !permissions.contains(Permissions::SPEAK) {
                return Err(MusicError::MissingVoicePermission("speak in the voice channel"));
            }
        }
        None => debug!("Own member not cached in guild {}, skipping permission check", guild_id),
    }

    let occupants = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .count();
    let already_there = guild
        .voice_states
        .get(&bot_id)
        .is_some_and(|state| state.channel_id == Some(channel_id));

    if !already_there && is_full(channel.user_limit, occupants) {
        return Err(MusicError::VoiceChannelFull);
    }
    Ok(())
}

/// Voice checks shared by commands and buttons.
pub fn validate_listener(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
    user_id: UserId,
    require_queue: bool,
) -> Result<Listener, MusicError> {
    let channel = user_voice_channel(ctx, guild_id, user_id).ok_or(MusicError::NotInVoiceChannel)?;
    let queue = data.queues.get(guild_id);

    match &queue {
        None if require_queue => return Err(MusicError::NothingPlaying),
        Some(queue) if queue.voice_channel != channel => {
            return Err(MusicError::WrongVoiceChannel);
        }
        _ => {}
    }

    check_voice_permissions(ctx, guild_id, channel)?;
    Ok(Listener {
        guild_id,
        channel,
        queue,
    })
}

pub async fn on_voice_state_update(
    ctx: &serenity::Context,
    data: &Data,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };
    let Some(queue) = data.queues.get(guild_id) else {
        return;
    };
    let bot_id = ctx.cache.current_user().id;

    if new.user_id == bot_id {
        match new.channel_id {
            None => {
                warn!("Disconnected from voice in guild {}, cleaning up", guild_id);
                leave(data, guild_id).await;
            }
            Some(channel) if channel != queue.voice_channel => {
                info!("Moved to voice channel {} in guild {}", channel, guild_id);
                let _ = data.queues.with_queue(guild_id, |q| {
                    q.voice_channel = channel;
                    Ok(())
                });
            }
            Some(_) => {}
        }
        return;
    }

    let bot_channel = queue.voice_channel;
    let was_in = old.and_then(|state| state.channel_id) == Some(bot_channel);
    let is_in = new.channel_id == Some(bot_channel);

    if was_in && !is_in {
        if listeners_in(ctx, guild_id, bot_channel) == 0
            && !data.sessions.has_timer(guild_id, Timer::Alone)
        {
            start_alone_timer(ctx, data, guild_id, bot_channel);
        }
    } else if is_in && data.sessions.cancel_timer(guild_id, Timer::Alone) {
        info!("Listener returned in guild {}, alone timer cancelled", guild_id);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Reconnect {
    Recovered,
    Failed(String),
    TimedOut,
}

/// Runs a reconnect attempt, giving up after `grace`.
async fn reconnect_within<T, E: std::fmt::Display>(
    grace: Duration,
    attempt: impl Future<Output = Result<T, E>>,
) -> Reconnect {
    match tokio::time::timeout(grace, attempt).await {
        Ok(Ok(_)) => Reconnect::Recovered,
        Ok(Err(e)) => Reconnect::Failed(e.to_string()),
        Err(_) => Reconnect::TimedOut,
    }
}

struct DisconnectWatcher {
    ctx: serenity::Context,
    data: Data,
    guild_id: GuildId,
    reconnecting: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::DriverDisconnect(info) = ctx else {
            return None;
        };
        // A missing reason means the disconnect was requested locally.
        if info.reason.is_none() {
            return None;
        }
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return None;
        }

        warn!(
            "Voice driver disconnected in guild {}: {:?}",
            self.guild_id, info.reason
        );
        let (ctx, data, guild_id) = (self.ctx.clone(), self.data.clone(), self.guild_id);
        let reconnecting = self.reconnecting.clone();

        tokio::spawn(async move {
            let Some(channel) = data.queues.get(guild_id).map(|q| q.voice_channel) else {
                reconnecting.store(false, Ordering::Release);
                return;
            };

            let outcome =
                reconnect_within(RECONNECT_GRACE, data.songbird.join(guild_id, channel)).await;

            match outcome {
                Reconnect::Recovered => {
                    reconnecting.store(false, Ordering::Release);
                    info!("Reconnected to voice channel {} in guild {}", channel, guild_id);
                }
                failure => {
                    warn!(
                        "Voice connection in guild {} did not recover: {:?}",
                        guild_id, failure
                    );
                    if data.queues.contains(guild_id) {
                        leave_with_notice(
                            &ctx,
                            &data,
                            guild_id,
                            "Lost the voice connection and could not reconnect.",
                        )
                        .await;
                    }
                }
            }
        });

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: UserId = UserId::new(1);
    const ROOM: ChannelId = ChannelId::new(100);
    const OTHER_ROOM: ChannelId = ChannelId::new(200);

    #[test]
    fn only_humans_in_the_channel_count() {
        let states = [
            (Some(ROOM), BOT, true),
            (Some(ROOM), UserId::new(2), false),
            (Some(ROOM), UserId::new(3), true),
            (Some(OTHER_ROOM), UserId::new(4), false),
            (None, UserId::new(5), false),
        ];

        assert_eq!(count_listeners(states, ROOM, BOT), 1);
        assert_eq!(count_listeners(states, OTHER_ROOM, BOT), 1);
    }

    #[test]
    fn bot_alone_counts_zero() {
        assert_eq!(count_listeners([(Some(ROOM), BOT, true)], ROOM, BOT), 0);
    }

    #[test]
    fn user_limit_zero_means_unlimited() {
        assert!(!is_full(None, 99));
        assert!(!is_full(Some(0), 99));
        assert!(!is_full(Some(5), 4));
        assert!(is_full(Some(5), 5));
    }

    #[tokio::test]
    async fn reconnect_succeeds_within_grace() {
        let outcome = reconnect_within(Duration::from_millis(100), async { Ok::<_, String>(()) }).await;
        assert_eq!(outcome, Reconnect::Recovered);
    }

    #[tokio::test]
    async fn failed_rejoin_reports_the_error() {
        let outcome = reconnect_within(Duration::from_millis(100), async {
            Err::<(), _>("endpoint unreachable")
        })
        .await;
        assert_eq!(outcome, Reconnect::Failed("endpoint unreachable".into()));
    }

    #[tokio::test]
    async fn stalled_rejoin_times_out() {
        let outcome = reconnect_within(
            Duration::from_millis(20),
            std::future::pending::<Result<(), String>>(),
        )
        .await;
        assert_eq!(outcome, Reconnect::TimedOut);
    }
}
