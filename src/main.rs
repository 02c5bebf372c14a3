use anyhow::{Context, Result, anyhow};
use archivist::{
    ArchivistConfig, CommandDescriptor, CommandRegistry, Entity, ExecutionContext, FieldRule,
    GetOptions, InMemoryVault, PersistenceAdapter, Topic, TypeRegistry, Validate,
    ValidationSchema, VaultRouter, raw_index, transform::to_plain,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Developer tooling for typed topics and validated commands")]
struct Cli {
    /// Log filter, e.g. `info` or `archivist=debug`
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the player rename scenario against an in-memory vault
    Demo {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "p1")]
        player_id: String,
        #[arg(long, default_value = "Ann")]
        name: String,
    },
    /// Parse a config file and print it with defaults applied
    CheckConfig {
        #[arg(long)]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerIndex {
    player_id: String,
}

impl Validate for PlayerIndex {
    fn validation_schema() -> ValidationSchema {
        ValidationSchema::new().field(FieldRule::new("playerId").is_string().not_empty())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlayerData {
    name: String,
}

impl Validate for PlayerData {
    fn validation_schema() -> ValidationSchema {
        ValidationSchema::new().field(FieldRule::new("name").is_string().not_empty())
    }
}

struct Player;

impl Topic for Player {
    const NAME: &'static str = "Player";
    const INDEX: &'static [&'static str] = &["playerId"];
    const VAULTS: &'static [&'static str] = &["memory"];

    type Index = PlayerIndex;
    type Data = PlayerData;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level)
                .with_context(|| format!("Invalid log filter '{}'", cli.log_level))?,
        )
        .init();

    match cli.command {
        Command::Demo {
            config,
            player_id,
            name,
        } => demo(config.as_deref(), &player_id, &name).await,
        Command::CheckConfig { path } => {
            let config = ArchivistConfig::from_path(&path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn demo(config_path: Option<&Path>, player_id: &str, name: &str) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ArchivistConfig::from_path(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ArchivistConfig::default(),
    };

    let mut types = TypeRegistry::with_builtins();
    types.register_entity::<Player>()?;

    for route in types.topics().routes() {
        if config.route_for(&route.topic).is_none() {
            config = config.route(route);
        }
    }

    let vault = InMemoryVault::new("memory");
    let mut vaults: HashMap<String, Arc<dyn PersistenceAdapter>> = HashMap::new();
    vaults.insert("memory".to_string(), Arc::new(vault.clone()));
    let router = VaultRouter::from_config(&config, vaults)?;

    let ctx = ExecutionContext::new(Arc::new(router), Arc::new(config));

    let mut commands = CommandRegistry::new(types);
    commands.register(
        CommandDescriptor::new("renamePlayer")
            .param("player", "Player")
            .param("name", "string")
            .acl(&["user"])
            .input(ValidationSchema::new().field(FieldRule::new("name").is_string().max_length(32)))
            .output(ValidationSchema::new().field(FieldRule::new("name").is_string().not_empty())),
        |_ctx: ExecutionContext, mut args: archivist::CastArgs| async move {
            let mut player: Entity<Player> = args.take(0)?;
            let name: String = args.take(1)?;
            player.data_mut().name = name;
            player.save().await?;
            to_plain(player.data())
        },
    )?;

    info!(
        topics = commands.types().topics().len(),
        commands = commands.names().count(),
        "demo ready"
    );

    let result = commands
        .execute(
            &ctx,
            "renamePlayer",
            vec![
                json!({ "index": { "playerId": player_id }, "name": "unnamed" }),
                Value::String(name.to_string()),
            ],
        )
        .await;

    match result {
        Ok(value) => println!("renamePlayer -> {}", value),
        Err(err) => {
            let details = err
                .validation()
                .map(|v| serde_json::to_string(&v.details))
                .transpose()?
                .unwrap_or_default();
            return Err(anyhow!("renamePlayer failed ({:?}): {} {}", err.class(), err, details));
        }
    }

    let index = raw_index(json!({ "playerId": player_id }))?;
    let stored = Entity::<Player>::get(&ctx, &index, &GetOptions::default())
        .await?
        .ok_or_else(|| anyhow!("player '{}' was not stored", player_id))?;
    println!("stored -> {}", stored.view()?);
    println!("records in vault: {}", vault.count(Player::NAME).await);
    Ok(())
}
