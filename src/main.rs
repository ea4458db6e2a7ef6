use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod storage;
mod tts;

use crate::audio::{player::SongbirdSinks, scheduler::Scheduler};
use crate::bot::{DiscordNotifier, TtsBot};
use crate::config::Config;
use crate::storage::{JsonStorage, QueueStore, StoreWriter};
use crate::tts::{PiperSynthesizer, ProviderRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("neko_tts=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🐱 Iniciando neko-tts v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Cargar proveedores TTS
    let providers = Arc::new(ProviderRegistry::load(&config.tts_config_dir).await?);
    if providers.is_empty() {
        error!(
            "⚠️ No hay proveedores TTS en {}; /tts no funcionará",
            config.tts_config_dir.display()
        );
    }

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config, &providers).await;
    }

    // Cola persistida: se carga una vez y la escribe una sola tarea
    let queue_store = QueueStore::new(config.queue_file());
    let document = queue_store.load().await;
    if document.is_empty() {
        info!("📂 Sin colas previas en {}", queue_store.path().display());
    }
    let store_writer = StoreWriter::spawn(queue_store, document.clone());

    let songbird = Songbird::serenity();
    let notifier = Arc::new(DiscordNotifier::new(Arc::new(Http::new(&config.discord_token))));

    let scheduler = Scheduler::new(
        store_writer,
        Arc::new(SongbirdSinks::new(songbird.clone())),
        notifier.clone(),
    );
    scheduler.restore(&document);

    // Inicializar almacenamiento JSON
    let prefs = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone()).await?,
    ));
    let synthesizer = Arc::new(PiperSynthesizer::new(config.audio_dir.clone()).await?);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = TtsBot::new(
        config.clone(),
        scheduler,
        providers,
        prefs,
        synthesizer,
        notifier,
        songbird.clone(),
    );

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Comprueba que el intérprete del proveedor por defecto tenga piper instalado
async fn health_check(config: &Config, providers: &ProviderRegistry) -> Result<()> {
    let provider = providers.require(&config.default_provider)?;

    let piper = async_process::Command::new(&provider.python_path)
        .arg("-m")
        .arg("piper")
        .arg("--help")
        .output()
        .await?;

    if piper.status.success() && provider.model_path().exists() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("piper o el modelo de {} no disponibles", config.default_provider);
    }
}
