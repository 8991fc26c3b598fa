//! Command line interface. Flags override the environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "entity-graphql", version, about = "GraphQL API generated from entity descriptors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the generated schema document
    Sdl {
        /// Descriptor file (YAML or JSON)
        #[arg(long)]
        entities: Option<PathBuf>,
    },
    /// Serve the GraphQL API over HTTP
    Serve {
        #[arg(long)]
        entities: Option<PathBuf>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        database_url: Option<String>,
    },
}
