// incident_ingestor/src/main.rs
// Main entry point for the incident_ingestor CLI application.

use std::path::Path;

use clap::Parser;
use incident_ingestor::cli::{Cli, Commands};
use incident_ingestor::error::Result;
use incident_ingestor::ingestor::run_with_report;
use incident_ingestor::memory::MemoryGraph;
use incident_ingestor::neo4j::Neo4jStore;
use incident_ingestor::schema::Label;
use incident_ingestor::store::GraphStore;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(),> {
    // Initialize tracing
    let file_appender = tracing_appender::rolling::never(".", "ingestor.log",);
    let (non_blocking, _guard,) = tracing_appender::non_blocking(file_appender,);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),),)
        .with(fmt::layer().with_writer(std::io::stderr,),)
        .with(fmt::layer().with_writer(non_blocking,).with_ansi(false,),)
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Neo4j(args,) => {
            let config = args.load.ingestor_config(cli.strict,)?;
            let store = Neo4jStore::connect(&args.connection(),).await?;
            let outcome = run_with_report(&store, &config,).await;
            store.close().await?;
            outcome
        },
        Commands::DryRun(args,) => {
            let config = args.load.ingestor_config(cli.strict,)?;
            let store = MemoryGraph::new();
            let outcome = run_with_report(&store, &config,).await;
            for label in Label::ALL {
                info!("{}: {} nodes", label, store.node_count(label,));
            }
            info!("{} relationships", store.total_edges());
            store.close().await?;
            outcome
        },
    };

    let (report, res,) = outcome;
    if cli.report {
        report.save(Path::new(incident_ingestor::DEFAULT_REPORT_PATH,),)?;
    }
    if let Err(e,) = &res {
        error!("Ingestion stopped: {}", e);
    }
    res
}
