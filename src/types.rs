use crate::{
    config::Config,
    queue::QueueStore,
    request::{Cooldowns, GuildLocks},
    session::Sessions,
};
use reqwest::Client;
use songbird::Songbird;
use std::{sync::Arc, time::Instant};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared bot state. Cheap to clone so songbird handlers and background tasks can own a copy.
#[derive(Clone)]
pub struct Data {
    pub http_client: Client,
    pub config: Arc<Config>,
    pub queues: Arc<QueueStore>,
    pub sessions: Arc<Sessions>,
    pub songbird: Arc<Songbird>,
    pub cooldowns: Arc<Cooldowns>,
    pub guild_locks: Arc<GuildLocks>,
    pub started_at: Instant,
}

impl Data {
    pub fn new(config: Arc<Config>, songbird: Arc<Songbird>) -> Self {
        Self {
            http_client: Client::new(),
            queues: Arc::new(QueueStore::new(config.max_queue_size, config.default_volume)),
            sessions: Arc::new(Sessions::default()),
            songbird,
            cooldowns: Arc::new(Cooldowns::default()),
            guild_locks: Arc::new(GuildLocks::default()),
            started_at: Instant::now(),
            config,
        }
    }
}
