//! Per-guild playback queues.
//!
//! [`GuildQueue`] holds the ordered tracks and the playback cursor of one guild,
//! [`QueueStore`] keys those records by guild. Everything here is synchronous
//! bookkeeping; the audio side lives in [`crate::player`].

mod clock;
mod store;

pub use clock::PlaybackClock;
pub use store::QueueStore;

use crate::error::MusicError;
use poise::serenity_prelude::{ChannelId, GuildId, User, UserId};
use rand::{Rng, seq::SliceRandom};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const PAGE_SIZE: usize = 10;
pub const MAX_VOLUME: u8 = 200;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum LoopMode {
    #[default]
    Off,
    Song,
    Queue,
}

impl LoopMode {
    /// Order used by the loop button.
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::Song,
            Self::Song => Self::Queue,
            Self::Queue => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Song => "Song",
            Self::Queue => "Queue",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Off => "disabled",
            Self::Song => "current song",
            Self::Queue => "entire queue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Youtube,
    Attachment,
}

impl TrackSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Youtube => "YOUTUBE",
            Self::Attachment => "FILE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requested_by: Requester,
    pub source: TrackSource,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: TrackSource,
        requested_by: Requester,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            url: url.into(),
            duration: None,
            thumbnail: None,
            requested_by,
            source,
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

/// Result of adding tracks to a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// 1-based position of the first added track.
    pub position: usize,
    pub added: usize,
    /// Set when the queue was idle: the first added track, now current and
    /// claimed for playback.
    pub start: Option<Track>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipOutcome {
    Next(Track),
    Exhausted,
}

/// Converts a 1-based position typed by a user into an index.
pub fn position_to_index(position: usize, len: usize) -> Result<usize, MusicError> {
    if position == 0 || position > len {
        return Err(MusicError::InvalidPosition { max: len });
    }

    Ok(position - 1)
}

pub fn total_pages(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE).max(1)
}

#[derive(Debug, Clone)]
pub struct GuildQueue {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
    pub tracks: Vec<Track>,
    pub current_index: usize,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub playing: bool,
    pub clock: PlaybackClock,
}

impl GuildQueue {
    pub fn new(
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        volume: u8,
    ) -> Self {
        Self {
            guild_id,
            text_channel,
            voice_channel,
            tracks: Vec::new(),
            current_index: 0,
            loop_mode: LoopMode::Off,
            volume: volume.min(MAX_VOLUME),
            playing: false,
            clock: PlaybackClock::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Neither playing nor paused: freshly created, stopped or run to the end.
    pub fn is_idle(&self) -> bool {
        !self.playing && !self.is_paused()
    }

    /// Appends a track and returns its 1-based position.
    pub fn add(&mut self, track: Track, max_size: usize) -> Result<usize, MusicError> {
        if self.tracks.len() >= max_size {
            return Err(MusicError::QueueFull { max: max_size });
        }

        self.tracks.push(track);
        Ok(self.tracks.len())
    }

    /// Appends as many tracks as fit and returns how many were taken.
    pub fn add_many(&mut self, tracks: Vec<Track>, max_size: usize) -> Result<usize, MusicError> {
        let space = max_size.saturating_sub(self.tracks.len());
        if space == 0 {
            return Err(MusicError::QueueFull { max: max_size });
        }

        let count = tracks.len().min(space);
        self.tracks.extend(tracks.into_iter().take(count));
        Ok(count)
    }

    /// Adds `tracks` and, if nothing is playing or paused, moves the cursor to
    /// the first of them and marks the queue as playing so later admissions
    /// leave it alone.
    pub fn admit(&mut self, tracks: Vec<Track>, max_size: usize) -> Result<Admission, MusicError> {
        let first_new = self.tracks.len();
        let added = self.add_many(tracks, max_size)?;

        let start = match self.tracks.get(first_new) {
            Some(track) if self.is_idle() => {
                let track = track.clone();
                self.current_index = first_new;
                self.playing = true;
                self.clock.reset();
                Some(track)
            }
            _ => None,
        };

        Ok(Admission {
            position: first_new + 1,
            added,
            start,
        })
    }

    pub fn remove(&mut self, index: usize) -> Result<Track, MusicError> {
        if index >= self.tracks.len() {
            return Err(MusicError::InvalidIndex);
        }
        if index == self.current_index {
            return Err(MusicError::CannotRemoveCurrent);
        }

        let removed = self.tracks.remove(index);
        if index < self.current_index {
            self.current_index -= 1;
        }

        Ok(removed)
    }

    /// Drops everything except the current track.
    pub fn clear(&mut self) {
        if self.tracks.is_empty() {
            return;
        }

        let current = self.tracks.swap_remove(self.current_index);
        self.tracks = vec![current];
        self.current_index = 0;
    }

    pub fn skip(&mut self) -> SkipOutcome {
        if self.tracks.is_empty() {
            return SkipOutcome::Exhausted;
        }

        match self.loop_mode {
            LoopMode::Song => {}
            LoopMode::Queue => self.current_index = (self.current_index + 1) % self.tracks.len(),
            LoopMode::Off => {
                if self.current_index + 1 >= self.tracks.len() {
                    return SkipOutcome::Exhausted;
                }
                self.current_index += 1;
            }
        }

        SkipOutcome::Next(self.tracks[self.current_index].clone())
    }

    /// Moves past a track that could not be played. Repeating a broken track is
    /// pointless, so `Song` loop behaves like `Off` here.
    pub fn skip_failed(&mut self) -> SkipOutcome {
        match self.loop_mode {
            LoopMode::Song => {
                self.loop_mode = LoopMode::Off;
                let outcome = self.skip();
                self.loop_mode = LoopMode::Song;
                outcome
            }
            _ => self.skip(),
        }
    }

    pub fn previous(&mut self) -> Result<Track, MusicError> {
        if self.tracks.is_empty() {
            return Err(MusicError::NothingPlaying);
        }

        self.current_index = match (self.current_index, self.loop_mode) {
            (0, LoopMode::Queue) => self.tracks.len() - 1,
            (0, _) => return Err(MusicError::NoPreviousTrack),
            (index, _) => index - 1,
        };

        Ok(self.tracks[self.current_index].clone())
    }

    pub fn jump_to(&mut self, index: usize) -> Result<Track, MusicError> {
        let track = self.tracks.get(index).cloned().ok_or(MusicError::InvalidIndex)?;
        self.current_index = index;
        Ok(track)
    }

    /// Shuffles the upcoming and past tracks, pinning the current one first.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MusicError> {
        if self.tracks.len() <= 1 {
            return Err(MusicError::NotEnoughTracks);
        }

        let current = self.tracks.remove(self.current_index);
        self.tracks.shuffle(rng);
        self.tracks.insert(0, current);
        self.current_index = 0;

        Ok(())
    }

    pub fn shuffle(&mut self) -> Result<(), MusicError> {
        self.shuffle_with(&mut rand::thread_rng())
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<(), MusicError> {
        if volume > MAX_VOLUME {
            return Err(MusicError::VolumeOutOfRange);
        }

        self.volume = volume;
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), MusicError> {
        if self.is_paused() {
            return Err(MusicError::AlreadyPaused);
        }
        if !self.playing || self.current().is_none() {
            return Err(MusicError::NothingPlaying);
        }

        self.playing = false;
        self.clock.pause(now);
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), MusicError> {
        if self.playing {
            return Err(MusicError::AlreadyPlaying);
        }
        if !self.is_paused() {
            return Err(MusicError::NothingPlaying);
        }

        self.playing = true;
        self.clock.resume(now);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.clock.reset();
    }

    pub fn mark_started(&mut self, now: Instant) {
        self.playing = true;
        self.clock.start(now);
    }

    /// Position inside the current track, capped at its duration when known.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let elapsed = self.clock.elapsed(now);
        match self.current().and_then(|track| track.duration) {
            Some(duration) => elapsed.min(duration),
            None => elapsed,
        }
    }

    /// Index range of the tracks shown on a queue page (1-based page).
    pub fn page_range(&self, page: usize) -> Result<std::ops::Range<usize>, MusicError> {
        let pages = total_pages(self.tracks.len());
        if page == 0 || page > pages {
            return Err(MusicError::InvalidPage { max: pages });
        }

        let start = (page - 1) * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(self.tracks.len());
        Ok(start..end)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    pub fn track(title: &str) -> Track {
        Track::new(
            title,
            format!("https://youtu.be/{title}"),
            TrackSource::Youtube,
            Requester {
                id: UserId::new(7),
                name: "listener".into(),
            },
        )
    }

    pub fn queue_of(titles: &[&str]) -> GuildQueue {
        let mut queue = GuildQueue::new(GuildId::new(1), ChannelId::new(2), ChannelId::new(3), 50);
        for title in titles {
            queue.add(track(title), 100).unwrap();
        }
        queue
    }

    fn title(outcome: SkipOutcome) -> Option<String> {
        match outcome {
            SkipOutcome::Next(track) => Some(track.title),
            SkipOutcome::Exhausted => None,
        }
    }

    #[test]
    fn skip_walks_to_the_end_without_loop() {
        let mut queue = queue_of(&["A", "B", "C"]);

        assert_eq!(title(queue.skip()).as_deref(), Some("B"));
        assert_eq!(queue.current_index, 1);
        assert_eq!(title(queue.skip()).as_deref(), Some("C"));
        assert_eq!(queue.current_index, 2);
        assert_eq!(queue.skip(), SkipOutcome::Exhausted);
        assert_eq!(queue.current_index, 2);
        assert_eq!(queue.skip(), SkipOutcome::Exhausted);
        assert_eq!(queue.current_index, 2);
    }

    #[test]
    fn song_loop_repeats_current() {
        let mut queue = queue_of(&["A", "B"]);
        queue.current_index = 1;
        queue.loop_mode = LoopMode::Song;

        assert_eq!(title(queue.skip()).as_deref(), Some("B"));
        assert_eq!(queue.current_index, 1);
    }

    #[test]
    fn queue_loop_wraps_to_start() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.current_index = 2;
        queue.loop_mode = LoopMode::Queue;

        assert_eq!(title(queue.skip()).as_deref(), Some("A"));
        assert_eq!(queue.current_index, 0);
    }

    #[test]
    fn failed_track_is_not_repeated() {
        let mut queue = queue_of(&["A", "B"]);
        queue.loop_mode = LoopMode::Song;

        assert_eq!(title(queue.skip_failed()).as_deref(), Some("B"));
        assert_eq!(queue.skip_failed(), SkipOutcome::Exhausted);
        assert_eq!(queue.loop_mode, LoopMode::Song);
    }

    #[test]
    fn skip_on_empty_queue_is_exhausted() {
        let mut queue = queue_of(&[]);
        queue.loop_mode = LoopMode::Queue;
        assert_eq!(queue.skip(), SkipOutcome::Exhausted);
    }

    #[test]
    fn add_rejects_when_full() {
        let mut queue = queue_of(&["A", "B"]);

        assert_eq!(queue.add(track("C"), 2), Err(MusicError::QueueFull { max: 2 }));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.add(track("C"), 3), Ok(3));
    }

    #[test]
    fn add_many_truncates_to_free_space() {
        let mut queue = queue_of(&["A"]);
        let batch = vec![track("B"), track("C"), track("D")];

        assert_eq!(queue.add_many(batch, 3), Ok(2));
        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.add_many(vec![track("E")], 3),
            Err(MusicError::QueueFull { max: 3 })
        );
    }

    #[test]
    fn remove_keeps_cursor_on_current_track() {
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        queue.current_index = 2;

        assert_eq!(queue.remove(2), Err(MusicError::CannotRemoveCurrent));
        assert_eq!(queue.remove(9), Err(MusicError::InvalidIndex));

        assert_eq!(queue.remove(0).unwrap().title, "A");
        assert_eq!(queue.current_index, 1);
        assert_eq!(queue.current().unwrap().title, "C");

        assert_eq!(queue.remove(2).unwrap().title, "D");
        assert_eq!(queue.current_index, 1);
    }

    #[test]
    fn clear_keeps_only_current() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.current_index = 1;
        queue.clear();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current_index, 0);
        assert_eq!(queue.current().unwrap().title, "B");
    }

    #[test]
    fn previous_stops_at_start_unless_looping_queue() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.current_index = 1;

        assert_eq!(queue.previous().unwrap().title, "A");
        assert_eq!(queue.previous(), Err(MusicError::NoPreviousTrack));
        assert_eq!(queue.current_index, 0);

        queue.loop_mode = LoopMode::Queue;
        assert_eq!(queue.previous().unwrap().title, "C");
    }

    #[test]
    fn jump_validates_index() {
        let mut queue = queue_of(&["A", "B"]);
        assert_eq!(queue.jump_to(2), Err(MusicError::InvalidIndex));
        assert_eq!(queue.jump_to(1).unwrap().title, "B");
        assert_eq!(queue.current_index, 1);
    }

    #[test]
    fn shuffle_pins_current_track_first() {
        let mut queue = queue_of(&["A", "B", "C", "D", "E", "F"]);
        queue.current_index = 3;
        let mut rng = StdRng::seed_from_u64(42);

        queue.shuffle_with(&mut rng).unwrap();

        assert_eq!(queue.current_index, 0);
        assert_eq!(queue.tracks[0].title, "D");
        let mut titles: Vec<_> = queue.tracks.iter().map(|t| t.title.as_str()).collect();
        titles.sort_unstable();
        assert_eq!(titles, ["A", "B", "C", "D", "E", "F"]);
    }

    #[test]
    fn shuffle_needs_two_tracks() {
        let mut queue = queue_of(&["A"]);
        assert_eq!(queue.shuffle(), Err(MusicError::NotEnoughTracks));
        assert_eq!(queue_of(&[]).shuffle(), Err(MusicError::NotEnoughTracks));
    }

    #[test]
    fn rejected_volume_leaves_previous_value() {
        let mut queue = queue_of(&["A"]);
        queue.set_volume(150).unwrap();

        assert_eq!(queue.set_volume(250), Err(MusicError::VolumeOutOfRange));
        assert_eq!(queue.volume, 150);
    }

    #[test]
    fn pause_and_resume_track_state() {
        let t0 = Instant::now();
        let mut queue = queue_of(&["A"]);

        assert_eq!(queue.pause(t0), Err(MusicError::NothingPlaying));
        queue.mark_started(t0);
        queue.pause(t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(
            queue.pause(t0 + Duration::from_secs(4)),
            Err(MusicError::AlreadyPaused)
        );
        assert!(!queue.is_idle());

        queue.resume(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(
            queue.resume(t0 + Duration::from_secs(11)),
            Err(MusicError::AlreadyPlaying)
        );
        assert_eq!(queue.elapsed(t0 + Duration::from_secs(12)), Duration::from_secs(5));

        queue.stop();
        assert!(queue.is_idle());
        assert_eq!(
            queue.resume(t0 + Duration::from_secs(13)),
            Err(MusicError::NothingPlaying)
        );
    }

    #[test]
    fn elapsed_is_capped_by_duration() {
        let t0 = Instant::now();
        let mut queue = queue_of(&[]);
        queue
            .add(track("A").with_duration(Some(Duration::from_secs(30))), 10)
            .unwrap();
        queue.mark_started(t0);

        assert_eq!(queue.elapsed(t0 + Duration::from_secs(45)), Duration::from_secs(30));
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(position_to_index(1, 3), Ok(0));
        assert_eq!(position_to_index(3, 3), Ok(2));
        assert_eq!(position_to_index(0, 3), Err(MusicError::InvalidPosition { max: 3 }));
        assert_eq!(position_to_index(4, 3), Err(MusicError::InvalidPosition { max: 3 }));
    }

    #[test]
    fn pages_cover_the_queue() {
        let titles: Vec<String> = (0..23).map(|i| format!("T{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let queue = queue_of(&refs);

        assert_eq!(total_pages(queue.len()), 3);
        assert_eq!(queue.page_range(1), Ok(0..10));
        assert_eq!(queue.page_range(3), Ok(20..23));
        assert_eq!(queue.page_range(4), Err(MusicError::InvalidPage { max: 3 }));
        assert_eq!(total_pages(0), 1);
    }

    #[test]
    fn loop_button_cycles_modes() {
        assert_eq!(LoopMode::Off.cycle(), LoopMode::Song);
        assert_eq!(LoopMode::Song.cycle(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.cycle(), LoopMode::Off);
        assert_eq!(LoopMode::default(), LoopMode::Off);
    }
}
