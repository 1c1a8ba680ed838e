//! Runtime handles that belong to a guild's playback but not to its queue:
//! the songbird track handle and the background tasks tied to it.

use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use songbird::tracks::TrackHandle;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Inactivity,
    Alone,
}

#[derive(Default)]
pub struct Session {
    pub track: Option<TrackHandle>,
    pub progress: Option<JoinHandle<()>>,
    pub inactivity: Option<JoinHandle<()>>,
    pub alone: Option<JoinHandle<()>>,
    /// Tracks that failed in a row without anything becoming playable.
    pub failures: usize,
}

impl Session {
    fn timer_slot(&mut self, timer: Timer) -> &mut Option<JoinHandle<()>> {
        match timer {
            Timer::Inactivity => &mut self.inactivity,
            Timer::Alone => &mut self.alone,
        }
    }

    fn abort_all(&mut self) {
        for task in [
            self.progress.take(),
            self.inactivity.take(),
            self.alone.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[derive(Default)]
pub struct Sessions(DashMap<GuildId, Session>);

impl Sessions {
    /// Installs a new active track handle, returning the one it supersedes.
    pub fn replace_track(&self, guild_id: GuildId, handle: TrackHandle) -> Option<TrackHandle> {
        self.0.entry(guild_id).or_default().track.replace(handle)
    }

    pub fn take_track(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.0.get_mut(&guild_id).and_then(|mut session| session.track.take())
    }

    pub fn track(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.0.get(&guild_id).and_then(|session| session.track.clone())
    }

    /// Claims the active handle if its uuid matches. Only one caller can win, so
    /// duplicate end/error notifications for the same track are dropped.
    pub fn release_if_active(&self, guild_id: GuildId, uuid: Uuid) -> bool {
        let Some(mut session) = self.0.get_mut(&guild_id) else {
            return false;
        };

        if session.track.as_ref().map(TrackHandle::uuid) == Some(uuid) {
            session.track = None;
            true
        } else {
            false
        }
    }

    pub fn set_progress(&self, guild_id: GuildId, task: JoinHandle<()>) {
        if let Some(old) = self.0.entry(guild_id).or_default().progress.replace(task) {
            old.abort();
        }
    }

    pub fn cancel_progress(&self, guild_id: GuildId) {
        if let Some(task) = self.0.get_mut(&guild_id).and_then(|mut s| s.progress.take()) {
            task.abort();
        }
    }

    pub fn set_timer(&self, guild_id: GuildId, timer: Timer, task: JoinHandle<()>) {
        let mut session = self.0.entry(guild_id).or_default();
        if let Some(old) = session.timer_slot(timer).replace(task) {
            old.abort();
        }
    }

    pub fn cancel_timer(&self, guild_id: GuildId, timer: Timer) -> bool {
        match self
            .0
            .get_mut(&guild_id)
            .and_then(|mut session| session.timer_slot(timer).take())
        {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Forgets a timer without aborting it. A timer task calls this on itself
    /// before tearing the guild down, since teardown aborts every task.
    pub fn detach_timer(&self, guild_id: GuildId, timer: Timer) {
        if let Some(mut session) = self.0.get_mut(&guild_id) {
            session.timer_slot(timer).take();
        }
    }

    pub fn has_timer(&self, guild_id: GuildId, timer: Timer) -> bool {
        self.0
            .get(&guild_id)
            .is_some_and(|session| match timer {
                Timer::Inactivity => session.inactivity.is_some(),
                Timer::Alone => session.alone.is_some(),
            })
    }

    pub fn record_failure(&self, guild_id: GuildId) -> usize {
        let mut session = self.0.entry(guild_id).or_default();
        session.failures += 1;
        session.failures
    }

    pub fn reset_failures(&self, guild_id: GuildId) {
        if let Some(mut session) = self.0.get_mut(&guild_id) {
            session.failures = 0;
        }
    }

    /// Drops the session, aborting its tasks, and hands back the track handle.
    pub fn remove(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.0
            .remove(&guild_id)
            .and_then(|(_, mut session)| session.track.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(3);

    fn sleeper() -> JoinHandle<()> {
        tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)))
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn replacing_a_timer_aborts_the_old_one() {
        let sessions = Sessions::default();
        let first = sleeper();
        let first_abort = first.abort_handle();

        sessions.set_timer(GUILD, Timer::Alone, first);
        sessions.set_timer(GUILD, Timer::Alone, sleeper());
        settle().await;

        assert!(first_abort.is_finished());
        assert!(sessions.has_timer(GUILD, Timer::Alone));
        assert!(!sessions.has_timer(GUILD, Timer::Inactivity));
    }

    #[tokio::test]
    async fn cancel_reports_whether_a_timer_was_pending() {
        let sessions = Sessions::default();
        assert!(!sessions.cancel_timer(GUILD, Timer::Inactivity));

        sessions.set_timer(GUILD, Timer::Inactivity, sleeper());
        assert!(sessions.cancel_timer(GUILD, Timer::Inactivity));
        assert!(!sessions.has_timer(GUILD, Timer::Inactivity));
    }

    #[tokio::test]
    async fn detached_timer_keeps_running() {
        let sessions = Sessions::default();
        let task = sleeper();
        let abort = task.abort_handle();

        sessions.set_timer(GUILD, Timer::Inactivity, task);
        sessions.detach_timer(GUILD, Timer::Inactivity);
        sessions.remove(GUILD);
        settle().await;

        assert!(!abort.is_finished());
        abort.abort();
    }

    #[tokio::test]
    async fn remove_aborts_everything() {
        let sessions = Sessions::default();
        let progress = sleeper();
        let progress_abort = progress.abort_handle();
        sessions.set_progress(GUILD, progress);
        sessions.set_timer(GUILD, Timer::Alone, sleeper());

        assert!(sessions.remove(GUILD).is_none());
        settle().await;

        assert!(progress_abort.is_finished());
        assert!(!sessions.has_timer(GUILD, Timer::Alone));
    }

    #[test]
    fn failures_count_until_reset() {
        let sessions = Sessions::default();
        assert_eq!(sessions.record_failure(GUILD), 1);
        assert_eq!(sessions.record_failure(GUILD), 2);
        sessions.reset_failures(GUILD);
        assert_eq!(sessions.record_failure(GUILD), 1);
    }
}
