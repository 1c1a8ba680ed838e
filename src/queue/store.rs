use super::{Admission, GuildQueue, LoopMode, SkipOutcome, Track};
use crate::error::MusicError;
use dashmap::DashMap;
use log::{debug, info};
use poise::serenity_prelude::{ChannelId, GuildId};
use std::time::{Duration, Instant};

/// All active queues, one per guild.
///
/// Every method takes the map guard only for the duration of a synchronous
/// update, so callers can freely `.await` between calls.
pub struct QueueStore {
    queues: DashMap<GuildId, GuildQueue>,
    max_queue_size: usize,
    default_volume: u8,
}

impl QueueStore {
    pub fn new(max_queue_size: usize, default_volume: u8) -> Self {
        Self {
            queues: DashMap::new(),
            max_queue_size,
            default_volume,
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn create(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
    ) -> GuildQueue {
        let queue = GuildQueue::new(guild_id, text_channel, voice_channel, self.default_volume);
        self.queues.insert(guild_id, queue.clone());
        info!("Created queue for guild {}", guild_id);
        queue
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildQueue> {
        self.queues.get(&guild_id).map(|queue| queue.clone())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    pub fn delete(&self, guild_id: GuildId) -> bool {
        let removed = self.queues.remove(&guild_id).is_some();
        if removed {
            info!("Deleted queue for guild {}", guild_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.queues.iter().map(|entry| *entry.key()).collect()
    }

    /// Runs `f` against the guild's queue under the map guard.
    pub fn with_queue<T>(
        &self,
        guild_id: GuildId,
        f: impl FnOnce(&mut GuildQueue) -> Result<T, MusicError>,
    ) -> Result<T, MusicError> {
        let mut queue = self.queues.get_mut(&guild_id).ok_or(MusicError::NoQueue)?;
        f(&mut queue)
    }

    /// Appends a track. See [`QueueStore::add_tracks`] for how playback is claimed.
    pub fn add_track(&self, guild_id: GuildId, track: Track) -> Result<Admission, MusicError> {
        let title = track.title.clone();
        let admission = self.admit(guild_id, vec![track])?;
        info!(
            "Added \"{}\" to queue for guild {} at position {}",
            title, guild_id, admission.position
        );
        Ok(admission)
    }

    /// Appends as many tracks as fit. When the queue is idle the first of them
    /// becomes current and is claimed for playback in the same update, so
    /// concurrent requests cannot both start.
    pub fn add_tracks(&self, guild_id: GuildId, tracks: Vec<Track>) -> Result<Admission, MusicError> {
        let offered = tracks.len();
        let admission = self.admit(guild_id, tracks)?;
        info!(
            "Added {} of {} tracks to queue for guild {}",
            admission.added, offered, guild_id
        );
        Ok(admission)
    }

    fn admit(&self, guild_id: GuildId, tracks: Vec<Track>) -> Result<Admission, MusicError> {
        let max = self.max_queue_size;
        let admission = self.with_queue(guild_id, |queue| queue.admit(tracks, max))?;
        if let Some(track) = &admission.start {
            debug!("Claimed start of \"{}\" in guild {}", track.title, guild_id);
        }
        Ok(admission)
    }

    pub fn remove_track(&self, guild_id: GuildId, index: usize) -> Result<Track, MusicError> {
        let removed = self.with_queue(guild_id, |queue| queue.remove(index))?;
        info!("Removed \"{}\" from queue for guild {}", removed.title, guild_id);
        Ok(removed)
    }

    pub fn clear(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| {
            queue.clear();
            Ok(())
        })?;
        info!("Cleared queue for guild {}", guild_id);
        Ok(())
    }

    pub fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome, MusicError> {
        let outcome = self.with_queue(guild_id, |queue| Ok(queue.skip()))?;
        debug!("Skip in guild {}: {:?}", guild_id, outcome_title(&outcome));
        Ok(outcome)
    }

    pub fn skip_failed(&self, guild_id: GuildId) -> Result<SkipOutcome, MusicError> {
        self.with_queue(guild_id, |queue| Ok(queue.skip_failed()))
    }

    pub fn previous(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        self.with_queue(guild_id, GuildQueue::previous)
    }

    pub fn jump_to(&self, guild_id: GuildId, index: usize) -> Result<Track, MusicError> {
        self.with_queue(guild_id, |queue| queue.jump_to(index))
    }

    pub fn shuffle(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.with_queue(guild_id, GuildQueue::shuffle)?;
        info!("Shuffled queue for guild {}", guild_id);
        Ok(())
    }

    pub fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| {
            queue.loop_mode = mode;
            Ok(())
        })?;
        info!("Loop mode set to {} for guild {}", mode.label(), guild_id);
        Ok(())
    }

    pub fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| queue.set_volume(volume))?;
        info!("Volume set to {}% for guild {}", volume, guild_id);
        Ok(())
    }

    pub fn pause(&self, guild_id: GuildId, now: Instant) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| queue.pause(now))
    }

    pub fn resume(&self, guild_id: GuildId, now: Instant) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| queue.resume(now))
    }

    pub fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| {
            queue.stop();
            Ok(())
        })
    }

    pub fn mark_started(&self, guild_id: GuildId, now: Instant) -> Result<(), MusicError> {
        self.with_queue(guild_id, |queue| {
            queue.mark_started(now);
            Ok(())
        })
    }

    pub fn elapsed(&self, guild_id: GuildId, now: Instant) -> Result<Duration, MusicError> {
        self.with_queue(guild_id, |queue| Ok(queue.elapsed(now)))
    }
}

fn outcome_title(outcome: &SkipOutcome) -> Option<&str> {
    match outcome {
        SkipOutcome::Next(track) => Some(&track.title),
        SkipOutcome::Exhausted => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::track;

    const GUILD: GuildId = GuildId::new(10);

    fn store() -> QueueStore {
        let store = QueueStore::new(3, 50);
        store.create(GUILD, ChannelId::new(1), ChannelId::new(2));
        store
    }

    #[test]
    fn absent_guild_reports_no_queue() {
        let store = QueueStore::new(10, 50);
        let other = GuildId::new(99);

        assert_eq!(store.add_track(other, track("A")), Err(MusicError::NoQueue));
        assert_eq!(store.skip(other), Err(MusicError::NoQueue));
        assert_eq!(store.clear(other), Err(MusicError::NoQueue));
        assert_eq!(store.pause(other, Instant::now()), Err(MusicError::NoQueue));
        assert_eq!(store.set_loop_mode(other, LoopMode::Song), Err(MusicError::NoQueue));
        assert!(!store.delete(other));
    }

    #[test]
    fn create_uses_configured_defaults_and_replaces() {
        let store = store();
        store.add_track(GUILD, track("A")).unwrap();
        store.set_volume(GUILD, 80).unwrap();

        let fresh = store.create(GUILD, ChannelId::new(5), ChannelId::new(6));
        assert_eq!(fresh.volume, 50);
        assert_eq!(fresh.loop_mode, LoopMode::Off);
        assert!(fresh.is_empty());
        assert_eq!(store.get(GUILD).unwrap().text_channel, ChannelId::new(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let store = store();
        assert_eq!(store.add_track(GUILD, track("A")).unwrap().position, 1);
        let batch = store
            .add_tracks(GUILD, vec![track("B"), track("C"), track("D")])
            .unwrap();
        assert_eq!((batch.position, batch.added), (2, 2));
        assert_eq!(
            store.add_track(GUILD, track("E")),
            Err(MusicError::QueueFull { max: 3 })
        );
        assert_eq!(store.get(GUILD).unwrap().len(), 3);
    }

    #[test]
    fn snapshots_do_not_alias_the_store() {
        let store = store();
        store.add_track(GUILD, track("A")).unwrap();

        let mut snapshot = store.get(GUILD).unwrap();
        snapshot.tracks.clear();

        assert_eq!(store.get(GUILD).unwrap().current().unwrap().title, "A");
    }

    #[test]
    fn delete_removes_record() {
        let store = store();
        assert!(store.contains(GUILD));
        assert!(store.delete(GUILD));
        assert!(store.get(GUILD).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn stop_keeps_queue_record() {
        let store = store();
        store.add_track(GUILD, track("A")).unwrap();
        store.mark_started(GUILD, Instant::now()).unwrap();
        store.stop(GUILD).unwrap();

        let queue = store.get(GUILD).unwrap();
        assert!(queue.is_idle());
        assert_eq!(queue.len(), 1);
    }

    fn started_title(admission: &Admission) -> Option<&str> {
        admission.start.as_ref().map(|track| track.title.as_str())
    }

    #[test]
    fn first_track_on_a_new_queue_is_claimed() {
        let store = store();
        let admission = store.add_track(GUILD, track("A")).unwrap();

        assert_eq!(started_title(&admission), Some("A"));
        let queue = store.get(GUILD).unwrap();
        assert_eq!(queue.current_index, 0);
        assert!(!queue.is_idle());
    }

    #[test]
    fn finished_queue_starts_at_the_new_track() {
        let store = store();
        store.add_tracks(GUILD, vec![track("A"), track("B")]).unwrap();
        store.mark_started(GUILD, Instant::now()).unwrap();
        store.skip(GUILD).unwrap();
        assert_eq!(store.skip(GUILD), Ok(SkipOutcome::Exhausted));
        store.stop(GUILD).unwrap();

        let admission = store.add_track(GUILD, track("C")).unwrap();
        assert_eq!(admission.position, 3);
        assert_eq!(started_title(&admission), Some("C"));
        assert_eq!(store.get(GUILD).unwrap().current_index, 2);
    }

    #[test]
    fn truncated_playlist_starts_at_its_first_track() {
        let store = store();
        store.add_track(GUILD, track("A")).unwrap();
        store.stop(GUILD).unwrap();

        let admission = store
            .add_tracks(GUILD, vec![track("B"), track("C"), track("D")])
            .unwrap();
        assert_eq!((admission.position, admission.added), (2, 2));
        assert_eq!(started_title(&admission), Some("B"));
        assert_eq!(store.get(GUILD).unwrap().current_index, 1);
    }

    #[test]
    fn paused_queue_is_not_restarted() {
        let store = store();
        let t0 = Instant::now();
        store.add_track(GUILD, track("A")).unwrap();
        store.mark_started(GUILD, t0).unwrap();
        store.pause(GUILD, t0 + Duration::from_secs(2)).unwrap();

        let admission = store.add_track(GUILD, track("B")).unwrap();
        assert_eq!(admission.start, None);
        let queue = store.get(GUILD).unwrap();
        assert_eq!(queue.current_index, 0);
        assert!(queue.is_paused());
    }

    #[test]
    fn second_admission_does_not_claim_again() {
        let store = store();
        let first = store.add_track(GUILD, track("A")).unwrap();
        let second = store.add_track(GUILD, track("B")).unwrap();

        assert_eq!(started_title(&first), Some("A"));
        assert_eq!(second.start, None);
        assert_eq!(second.position, 2);
        assert_eq!(store.get(GUILD).unwrap().current().unwrap().title, "A");
    }

    #[test]
    fn empty_batch_claims_nothing() {
        let store = store();
        let admission = store.add_tracks(GUILD, Vec::new()).unwrap();

        assert_eq!(admission.added, 0);
        assert_eq!(admission.start, None);
        assert!(store.get(GUILD).unwrap().is_idle());
    }
}
