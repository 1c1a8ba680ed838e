use clap::Parser;
use log::{error, info};
use poise::serenity_prelude as serenity;
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;

mod args;
mod commands;
mod components;
mod config;
mod controls;
mod embeds;
mod error;
mod events;
mod health;
mod logging;
mod player;
mod queue;
mod request;
mod session;
mod sources;
mod types;
mod voice;
use crate::{args::Args, config::Config, types::*};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            env_logger::builder()
                .filter_level(log::LevelFilter::Info)
                .init();
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    logging::init(&config);
    info!("Starting jukebox ({})", config.summary());

    let songbird = Songbird::serenity();
    let data = Data::new(config.clone(), songbird.clone());

    let health_data = data.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_data).await {
            error!("Health check server failed: {}", e);
        }
    });

    let setup_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |err| Box::pin(error::on_error(err)),
            post_command: |ctx| Box::pin(commands::post_command(ctx)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::handle(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered {} slash commands", framework.options().commands.len());
                Ok(setup_data)
            })
        })
        .build();

    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .application_id(config.client_id)
        .register_songbird_with(songbird)
        .framework(framework)
        .status(config.status)
        .activity(serenity::ActivityData::listening("/play to start"))
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            return;
        }
        info!("CTRL+C received, shutting down gracefully...");
        for guild_id in data.queues.guild_ids() {
            voice::leave(&data, guild_id).await;
        }
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}
