//! The shared "resolve, enqueue, start" flow behind `/play`, the request
//! channel and the search menu.

use crate::{
    components, embeds,
    error::MusicError,
    player,
    queue::{Requester, Track},
    sources::{self, Candidate, Resolution},
    types::Data,
    voice,
};
use dashmap::{DashMap, mapref::entry::Entry};
use log::{error, info, warn};
use poise::serenity_prelude::{
    self as serenity, Attachment, ChannelId, ComponentInteractionDataKind, CreateEmbed, EditMessage,
    EditInteractionResponse, GuildId, Message, UserId,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const COOLDOWN: Duration = Duration::from_secs(3);
pub const SELECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-user rate limit for the request channel.
#[derive(Default)]
pub struct Cooldowns(DashMap<UserId, Instant>);

impl Cooldowns {
    /// Returns `false` while the user is still cooling down.
    pub fn try_acquire(&self, user: UserId, now: Instant) -> bool {
        match self.0.entry(user) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < COOLDOWN {
                    return false;
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        true
    }
}

/// One async lock per guild so connecting and starting playback for a guild
/// happen one request at a time.
#[derive(Default)]
pub struct GuildLocks(DashMap<GuildId, Arc<Mutex<()>>>);

impl GuildLocks {
    pub async fn lock(&self, guild_id: GuildId) -> OwnedMutexGuard<()> {
        let lock = self.0.entry(guild_id).or_default().clone();
        lock.lock_owned().await
    }
}

/// Where a request plays and where its messages go.
#[derive(Debug, Clone, Copy)]
pub struct PlayTarget {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
}

pub enum Request {
    Single(Track),
    Playlist { title: String, tracks: Vec<Track> },
}

#[derive(Debug)]
pub enum Enqueued {
    Track {
        track: Track,
        position: usize,
        started: bool,
    },
    Playlist {
        title: String,
        added: usize,
        skipped: usize,
        started: bool,
    },
}

impl Enqueued {
    pub fn embed(&self) -> CreateEmbed {
        match self {
            Self::Track {
                track,
                started: true,
                ..
            } => embeds::success(format!(
                "Now playing **{}**",
                embeds::truncate(&track.title, 80)
            )),
            Self::Track {
                track, position, ..
            } => embeds::track_added(track, *position),
            Self::Playlist {
                title,
                added,
                skipped,
                ..
            } => embeds::playlist_added(title, *added, *skipped),
        }
    }
}

/// Result of resolving a query: queued straight away, or a choice is needed.
pub enum Outcome {
    Enqueued(Enqueued),
    Choose(Vec<Candidate>),
}

pub async fn play_query(
    ctx: &serenity::Context,
    data: &Data,
    target: &PlayTarget,
    requester: Requester,
    query: Option<&str>,
    attachment: Option<&Attachment>,
) -> Result<Outcome, MusicError> {
    if let Some(attachment) = attachment {
        let track = sources::attachment_track(attachment, requester, data.config.max_file_size_mb)?;
        let enqueued = enqueue(ctx, data, target, Request::Single(track)).await?;
        return Ok(Outcome::Enqueued(enqueued));
    }

    let query = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(MusicError::MissingQuery)?;

    let request = match sources::resolve(&data.http_client, query, requester).await? {
        Resolution::Single(track) => Request::Single(track),
        Resolution::Playlist { title, tracks } => Request::Playlist { title, tracks },
        Resolution::Candidates(candidates) => return Ok(Outcome::Choose(candidates)),
    };

    Ok(Outcome::Enqueued(enqueue(ctx, data, target, request).await?))
}

/// Adds tracks to the guild's queue, connecting first when needed, and starts
/// playback at the first new track if the queue was idle.
pub async fn enqueue(
    ctx: &serenity::Context,
    data: &Data,
    target: &PlayTarget,
    request: Request,
) -> Result<Enqueued, MusicError> {
    let guild_id = target.guild_id;
    voice::check_voice_permissions(ctx, guild_id, target.voice_channel)?;

    let _connecting = data.guild_locks.lock(guild_id).await;
    if !data.queues.contains(guild_id) || data.songbird.get(guild_id).is_none() {
        data.queues
            .create(guild_id, target.text_channel, target.voice_channel);
        if let Err(e) = voice::join(ctx, data, guild_id, target.voice_channel).await {
            error!("Failed to join voice in guild {}: {}", guild_id, e);
            data.queues.delete(guild_id);
            return Err(e);
        }
    }

    let (enqueued, claimed) = match request {
        Request::Single(track) => {
            let admission = data.queues.add_track(guild_id, track.clone())?;
            let claimed = admission.start.is_some();
            let enqueued = Enqueued::Track {
                track,
                position: admission.position,
                started: claimed,
            };
            (enqueued, claimed)
        }
        Request::Playlist { title, tracks } => {
            let offered = tracks.len();
            let admission = data.queues.add_tracks(guild_id, tracks)?;
            let claimed = admission.start.is_some();
            info!("Queued playlist \"{}\" in guild {}", title, guild_id);
            let enqueued = Enqueued::Playlist {
                title,
                added: admission.added,
                skipped: offered - admission.added,
                started: claimed,
            };
            (enqueued, claimed)
        }
    };

    if claimed {
        if let Err(e) = player::play_current(ctx, data, guild_id).await {
            player::halt(data, guild_id);
            return Err(e);
        }
    }

    Ok(enqueued)
}

/// Waits for the requester to pick a search result on `message`, then queues it.
/// The message is edited in place with the outcome.
pub async fn await_selection(
    ctx: &serenity::Context,
    data: &Data,
    target: PlayTarget,
    requester: Requester,
    mut message: Message,
    candidates: Vec<Candidate>,
) {
    let interaction = message
        .await_component_interaction(ctx)
        .author_id(requester.id)
        .custom_ids(vec![components::SEARCH_MENU_ID.to_string()])
        .timeout(SELECTION_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        let expired = EditMessage::new()
            .embed(embeds::error("Search timed out. Please try again."))
            .components(vec![]);
        if let Err(e) = message.edit(ctx, expired).await {
            warn!("Failed to expire search menu: {}", e);
        }
        return;
    };

    let chosen = match &interaction.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values
            .first()
            .and_then(|value| value.parse::<usize>().ok())
            .and_then(|index| candidates.get(index).cloned()),
        _ => None,
    };

    if let Err(e) = interaction.defer(ctx).await {
        warn!("Failed to acknowledge search selection: {}", e);
        return;
    }

    let embed = match chosen {
        Some(candidate) => {
            let track = candidate.into_track(requester);
            match enqueue(ctx, data, &target, Request::Single(track)).await {
                Ok(enqueued) => enqueued.embed(),
                Err(e) => {
                    warn!("Search selection failed in guild {}: {}", target.guild_id, e);
                    embeds::error(e.user_message())
                }
            }
        }
        None => embeds::error(MusicError::NoResults.user_message()),
    };

    let response = EditInteractionResponse::new().embed(embed).components(vec![]);
    if let Err(e) = interaction.edit_response(ctx, response).await {
        warn!("Failed to update search message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_rapid_requests() {
        let cooldowns = Cooldowns::default();
        let user = UserId::new(42);
        let t0 = Instant::now();

        assert!(cooldowns.try_acquire(user, t0));
        assert!(!cooldowns.try_acquire(user, t0 + Duration::from_secs(1)));
        assert!(!cooldowns.try_acquire(user, t0 + Duration::from_millis(2999)));
        assert!(cooldowns.try_acquire(user, t0 + COOLDOWN));
    }

    #[test]
    fn cooldowns_are_per_user() {
        let cooldowns = Cooldowns::default();
        let t0 = Instant::now();

        assert!(cooldowns.try_acquire(UserId::new(1), t0));
        assert!(cooldowns.try_acquire(UserId::new(2), t0 + Duration::from_millis(10)));
    }

    #[test]
    fn rejected_attempts_do_not_extend_the_cooldown() {
        let cooldowns = Cooldowns::default();
        let user = UserId::new(7);
        let t0 = Instant::now();

        cooldowns.try_acquire(user, t0);
        cooldowns.try_acquire(user, t0 + Duration::from_secs(2));
        assert!(cooldowns.try_acquire(user, t0 + Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn guild_lock_serializes_one_guild_only() {
        let locks = GuildLocks::default();
        let held = locks.lock(GuildId::new(1)).await;

        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(GuildId::new(1))).await;
        assert!(same.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(GuildId::new(2))).await;
        assert!(other.is_ok());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock(GuildId::new(1))).await;
        assert!(again.is_ok());
    }
}
