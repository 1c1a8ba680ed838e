//! Audio playback on top of songbird: starting the current track, reacting to
//! its end or failure, and forwarding transport controls to the live handle.

use crate::{
    components, embeds,
    error::MusicError,
    queue::{SkipOutcome, Track},
    sources,
    types::Data,
    voice,
};
use log::{debug, error, info, warn};
use poise::serenity_prelude::{
    self as serenity, CreateActionRow, CreateEmbed, CreateMessage, EditMessage, GuildId, MessageId,
    async_trait,
};
use songbird::{
    Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
    tracks::{PlayMode, ReadyState, Track as AudioTrack},
};
use std::time::{Duration, Instant};
use uuid::Uuid;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Songbird volume for a queue volume percentage.
pub fn gain(volume: u8) -> f32 {
    f32::from(volume) / 100.0
}

/// Starts the queue's current track, replacing whatever was playing.
pub async fn play_current(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
) -> Result<Track, MusicError> {
    let queue = data.queues.get(guild_id).ok_or(MusicError::NoQueue)?;
    let track = queue.current().cloned().ok_or(MusicError::NothingPlaying)?;
    let call = data
        .songbird
        .get(guild_id)
        .ok_or_else(|| MusicError::VoiceConnection("not connected to a voice channel".into()))?;

    if let Some(old) = data.sessions.take_track(guild_id) {
        let _ = old.stop();
    }

    let input = sources::input_for(&data.http_client, &track);
    let handle = {
        let mut handler = call.lock().await;
        handler.play(AudioTrack::from(input).volume(gain(queue.volume)))
    };

    let notifier = TrackNotifier {
        ctx: ctx.clone(),
        data: data.clone(),
        guild_id,
        track: track.clone(),
    };
    for event in [TrackEvent::End, TrackEvent::Error, TrackEvent::Playable] {
        if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
            warn!("Failed to register {:?} handler in guild {}: {}", event, guild_id, e);
        }
    }

    data.sessions.replace_track(guild_id, handle);
    data.queues.mark_started(guild_id, Instant::now())?;
    voice::cancel_inactivity_timer(data, guild_id);
    info!(
        "Playing \"{}\" in guild {} (requested by {})",
        track.title, guild_id, track.requested_by.name
    );

    announce(ctx, data, guild_id, track.id).await;
    Ok(track)
}

/// Posts the "Now Playing" message and keeps its progress bar fresh.
async fn announce(ctx: &serenity::Context, data: &Data, guild_id: GuildId, track_id: Uuid) {
    let Some(text_channel) = data.queues.get(guild_id).map(|q| q.text_channel) else {
        return;
    };
    let Some((embed, rows)) = now_playing_view(data, guild_id) else {
        return;
    };

    let message = CreateMessage::new().embed(embed).components(rows);
    match text_channel.send_message(ctx, message).await {
        Ok(message) => {
            let task = tokio::spawn(update_progress(
                ctx.clone(),
                data.clone(),
                guild_id,
                track_id,
                message.id,
            ));
            data.sessions.set_progress(guild_id, task);
        }
        Err(e) => warn!("Failed to announce track in guild {}: {}", guild_id, e),
    }
}

async fn update_progress(
    ctx: serenity::Context,
    data: Data,
    guild_id: GuildId,
    track_id: Uuid,
    message_id: MessageId,
) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;

        let Some(queue) = data.queues.get(guild_id) else {
            break;
        };
        if queue.current().map(|t| t.id) != Some(track_id) || queue.is_idle() {
            break;
        }
        if queue.is_paused() {
            continue;
        }
        let Some((embed, rows)) = now_playing_view(&data, guild_id) else {
            break;
        };

        let edit = EditMessage::new().embed(embed).components(rows);
        if let Err(e) = queue.text_channel.edit_message(&ctx, message_id, edit).await {
            debug!("Stopped progress updates in guild {}: {}", guild_id, e);
            break;
        }
    }
}

/// Embed and buttons describing the current track, or `None` without one.
pub fn now_playing_view(
    data: &Data,
    guild_id: GuildId,
) -> Option<(CreateEmbed, Vec<CreateActionRow>)> {
    let queue = data.queues.get(guild_id)?;
    let track = queue.current()?;
    let embed = embeds::now_playing(track, &queue, queue.elapsed(Instant::now()));

    Some((embed, components::now_playing_rows(queue.is_paused(), queue.loop_mode)))
}

#[derive(Clone)]
struct TrackNotifier {
    ctx: serenity::Context,
    data: Data,
    guild_id: GuildId,
    track: Track,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, handle) in tracks.iter() {
            match &state.playing {
                PlayMode::Play | PlayMode::Pause => {
                    if !matches!(state.ready, ReadyState::Playable) {
                        continue;
                    }
                    self.data.sessions.reset_failures(self.guild_id);
                }
                PlayMode::Errored(e) => {
                    if !self.data.sessions.release_if_active(self.guild_id, handle.uuid()) {
                        continue;
                    }
                    error!(
                        "Failed to play \"{}\" in guild {}: {}",
                        self.track.title, self.guild_id, e
                    );
                    let notifier = self.clone();
                    tokio::spawn(async move { notifier.on_failure().await });
                }
                PlayMode::End | PlayMode::Stop => {
                    if !self.data.sessions.release_if_active(self.guild_id, handle.uuid()) {
                        continue;
                    }
                    debug!("\"{}\" ended in guild {}", self.track.title, self.guild_id);
                    let notifier = self.clone();
                    tokio::spawn(async move {
                        advance(&notifier.ctx, &notifier.data, notifier.guild_id, false).await
                    });
                }
                _ => {}
            }
        }

        None
    }
}

impl TrackNotifier {
    async fn on_failure(self) {
        let failures = self.data.sessions.record_failure(self.guild_id);
        let queued = self.data.queues.get(self.guild_id).map_or(0, |q| q.len());

        if failures >= queued {
            finish(
                &self.ctx,
                &self.data,
                self.guild_id,
                "None of the queued songs could be played. Stopping playback.",
            )
            .await;
            return;
        }

        notify(
            &self.ctx,
            &self.data,
            self.guild_id,
            embeds::error(format!(
                "Failed to play **{}**. Skipping...",
                embeds::truncate(&self.track.title, 80)
            )),
        )
        .await;
        advance(&self.ctx, &self.data, self.guild_id, true).await;
    }
}

/// Moves to the next track after the current one ended or failed.
pub async fn advance(ctx: &serenity::Context, data: &Data, guild_id: GuildId, failed: bool) {
    let outcome = if failed {
        data.queues.skip_failed(guild_id)
    } else {
        data.queues.skip(guild_id)
    };

    match outcome {
        Ok(SkipOutcome::Next(_)) => {
            if let Err(e) = play_current(ctx, data, guild_id).await {
                error!("Failed to start next track in guild {}: {}", guild_id, e);
                finish(ctx, data, guild_id, "Playback stopped after an error.").await;
            }
        }
        Ok(SkipOutcome::Exhausted) => finish(ctx, data, guild_id, "Queue finished!").await,
        Err(MusicError::NoQueue) => debug!("Queue for guild {} is gone, not advancing", guild_id),
        Err(e) => error!("Failed to advance queue in guild {}: {}", guild_id, e),
    }
}

/// Ends playback but stays connected until the inactivity timer fires.
pub async fn finish(ctx: &serenity::Context, data: &Data, guild_id: GuildId, message: &str) {
    halt(data, guild_id);
    if data.queues.contains(guild_id) {
        info!("Playback finished in guild {}", guild_id);
        notify(ctx, data, guild_id, embeds::info("Queue", message)).await;
        voice::start_inactivity_timer(ctx, data, guild_id);
    }
}

/// Stops the live handle and progress updates, keeping the queue.
pub fn halt(data: &Data, guild_id: GuildId) {
    let _ = data.queues.stop(guild_id);
    data.sessions.cancel_progress(guild_id);
    if let Some(handle) = data.sessions.take_track(guild_id) {
        let _ = handle.stop();
    }
    data.sessions.reset_failures(guild_id);
}

pub async fn notify(ctx: &serenity::Context, data: &Data, guild_id: GuildId, embed: CreateEmbed) {
    let Some(channel) = data.queues.get(guild_id).map(|q| q.text_channel) else {
        return;
    };
    if let Err(e) = channel.send_message(ctx, CreateMessage::new().embed(embed)).await {
        warn!("Failed to send message to channel {}: {}", channel, e);
    }
}

pub async fn skip(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
) -> Result<SkipOutcome, MusicError> {
    let outcome = data.queues.skip(guild_id)?;
    if let SkipOutcome::Next(_) = outcome {
        play_current(ctx, data, guild_id).await?;
    }
    Ok(outcome)
}

pub async fn previous(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
) -> Result<Track, MusicError> {
    data.queues.previous(guild_id)?;
    play_current(ctx, data, guild_id).await
}

pub async fn jump(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: GuildId,
    index: usize,
) -> Result<Track, MusicError> {
    data.queues.jump_to(guild_id, index)?;
    play_current(ctx, data, guild_id).await
}

pub fn pause(data: &Data, guild_id: GuildId) -> Result<(), MusicError> {
    data.queues.pause(guild_id, Instant::now())?;
    if let Some(handle) = data.sessions.track(guild_id) {
        handle
            .pause()
            .map_err(|e| MusicError::Playback(e.to_string()))?;
    }
    info!("Paused playback in guild {}", guild_id);
    Ok(())
}

pub fn resume(data: &Data, guild_id: GuildId) -> Result<(), MusicError> {
    data.queues.resume(guild_id, Instant::now())?;
    if let Some(handle) = data.sessions.track(guild_id) {
        handle
            .play()
            .map_err(|e| MusicError::Playback(e.to_string()))?;
    }
    info!("Resumed playback in guild {}", guild_id);
    Ok(())
}

pub fn set_volume(data: &Data, guild_id: GuildId, volume: u8) -> Result<(), MusicError> {
    data.queues.set_volume(guild_id, volume)?;
    if let Some(handle) = data.sessions.track(guild_id) {
        if let Err(e) = handle.set_volume(gain(volume)) {
            warn!("Failed to apply volume in guild {}: {}", guild_id, e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_percent_maps_to_gain() {
        assert_eq!(gain(100), 1.0);
        assert_eq!(gain(50), 0.5);
        assert_eq!(gain(200), 2.0);
        assert_eq!(gain(0), 0.0);
    }
}
