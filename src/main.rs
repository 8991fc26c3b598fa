//! Entity GraphQL server
//!
//! Loads entity descriptors, prints the generated schema document or serves it over
//! HTTP on top of SQLite.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entity_graphql::config::{Config, DescriptorFile};
use entity_graphql::db::SqliteStorage;
use entity_graphql::graphql::{SchemaBuilder, build_executable};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entity_graphql=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Sdl { entities } => {
            if let Some(path) = entities {
                config.entities_path = path;
            }
            let file = DescriptorFile::load(&config.entities_path)?;
            let builder = SchemaBuilder::new(file.entities, file.options)?;
            print!("{}", builder.build_type_defs());
        }
        Command::Serve {
            entities,
            port,
            database_url,
        } => {
            if let Some(path) = entities {
                config.entities_path = path;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(url) = database_url {
                config.database_url = url;
            }
            serve(config).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Entity GraphQL");

    let file = DescriptorFile::load(&config.entities_path)?;
    let build = SchemaBuilder::new(file.entities, file.options)?.build();

    if let Some(dir) = config.database_dir() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let storage = SqliteStorage::connect(
        &config.database_url,
        config.database_max_connections,
        Arc::clone(&build.registry),
    )
    .await?;
    if config.create_tables {
        storage.create_tables().await?;
    }

    let executor = Arc::new(build.into_executor(Arc::new(storage)));
    let schema = build_executable(executor)?;

    entity_graphql::server::serve(schema, config.port).await
}
