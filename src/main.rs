use std::sync::Arc;

use guild_warden::commands::{SerenityGateway, builtin};
use guild_warden::events::{self, Dispatched, Dispatcher};
use guild_warden::handlers::Handler;
use guild_warden::rules::HttpRulesBackend;
use guild_warden::{BotConfig, Data, ERROR_TARGET, Error, logging};
use serenity::all::{Client, GatewayIntents, Http, ShardManager};
use tracing::{error, info};

/// Stop the bot once Ctrl-C is received
async fn shutdown_on_ctrl_c(
    data: Data,
    dispatcher: Arc<Dispatcher<Dispatched>>,
    http: Arc<Http>,
    shard_manager: Arc<ShardManager>,
) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(target: ERROR_TARGET, error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    logging::log_console("Shutting down".to_string());

    dispatcher.shutdown(data.config.shutdown_grace()).await;

    if data.config.remove_commands_on_shutdown {
        let gateway = SerenityGateway::new(http);
        if let Err(e) = data.commands.uninstall_all(&gateway).await {
            error!(target: ERROR_TARGET, error = %e, "Failed to remove slash commands");
        }
    }

    shard_manager.shutdown_all().await;
}

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = BotConfig::load().await?;
    info!(
        environment = ?config.environment,
        api = %config.api_base_url(),
        "Configuration loaded"
    );

    let backend = HttpRulesBackend::new(config.api_base_url(), config.http_timeout())?;
    let scope = config.default_scope();
    let data = Data::new(config, Arc::new(backend));

    builtin::register_defaults(&data.commands, scope)?;
    let dispatcher = Arc::new(Dispatcher::new(data.config.max_in_flight_events));
    events::register_defaults(&dispatcher, &data, scope)?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;
    let mut client = Client::builder(&data.config.discord_token, intents)
        .event_handler(Handler::new(data.clone(), Arc::clone(&dispatcher)))
        .await?;

    tokio::spawn(shutdown_on_ctrl_c(
        data.clone(),
        dispatcher,
        Arc::clone(&client.http),
        Arc::clone(&client.shard_manager),
    ));

    info!("Starting bot...");
    client.start().await?;

    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
