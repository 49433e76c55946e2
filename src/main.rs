use std::sync::Arc;

use airwave::{
    common::{
        banner::{BannerInfo, print_banner},
        logger,
        types::{AnyError, AnyResult},
    },
    configs::Config,
    gateway::GatewayHandler,
    player::{Controller, ControllerHandle, Recovery},
    sources::SourceSupplier,
    transport,
    voice::SongbirdTransport,
};
use serenity::{Client, all::GatewayIntents};
use songbird::{SerenityInit, Songbird};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    logger::init(&config.logging);

    let target = config.discord.target();
    print_banner(&BannerInfo::default(), target, config.source.descriptor.mode);
    info!("Source: {}", config.source.descriptor.url);

    let shutdown = CancellationToken::new();
    let manager = Songbird::serenity();
    let (handle, events) = ControllerHandle::channel();

    let supplier = Arc::new(SourceSupplier::new(&config.source)?);
    let voice = SongbirdTransport::new(manager.clone(), target, handle.clone());
    let controller = Controller::new(
        supplier,
        voice,
        Recovery::new(config.playback.retry_delay()),
        handle.clone(),
        events,
    );
    let status = controller.status();
    let controller_task = tokio::spawn(controller.run(shutdown.clone()));

    let server_task = if config.server.enabled {
        let server = config.server.clone();
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = transport::serve(&server, status, token).await {
                error!("Liveness server failed: {}", e);
            }
        }))
    } else {
        info!("Liveness server disabled");
        None
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        signal_token.cancel();
    });

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let mut client = Client::builder(&config.discord.token, intents)
        .event_handler(GatewayHandler::new(target, handle))
        .register_songbird_with(manager)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let mut gateway = tokio::spawn(async move { client.start().await });

    let mut failure: Option<AnyError> = None;
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = &mut gateway => {
            match result {
                Ok(Ok(())) => warn!("Gateway client exited"),
                Ok(Err(e)) => {
                    error!("Gateway client failed: {}", e);
                    failure = Some(e.into());
                }
                Err(e) => {
                    error!("Gateway task aborted: {}", e);
                    failure = Some(e.into());
                }
            }
            shutdown.cancel();
        }
    }

    // Leave the voice channel while the gateway is still up.
    if let Err(e) = controller_task.await {
        error!("Controller task failed: {}", e);
    }
    shard_manager.shutdown_all().await;
    if let Some(task) = server_task {
        let _ = task.await;
    }

    info!("Shutdown complete");
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
