// incident_ingestor/src/cli.rs
// Command Line Interface (CLI) specific logic for incident_ingestor.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{IngestorError, Result};
use crate::ingestor::{IngestorConfig, MissingKeyPolicy};
use crate::neo4j::ConnectionConfig;
use crate::schema::{RelKind, Representation, SchemaConfig, SchemaPreset};

/// Command Line Interface for the incident graph loader.
#[derive(Parser, Debug,)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Where to load the incident exports.
    #[clap(subcommand)]
    pub command: Commands,

    /// Abort the run on a row without protocollo instead of skipping it.
    #[clap(long)]
    pub strict: bool,

    /// Write a JSON summary of the run (ingestion_report.json) at the end.
    #[clap(long)]
    pub report: bool,
}

#[derive(Parser, Debug,)]
pub enum Commands {
    /// Load into a Neo4j database
    Neo4j(Neo4jArgs,),
    /// Plan and apply against an in-memory graph without touching a database
    DryRun(DryRunArgs,),
}

#[derive(Parser, Debug,)]
pub struct LoadArgs {
    /// Dataset root containing one directory per year, or a single export
    #[clap(short, long)]
    pub path: PathBuf,

    /// Number of operations committed per transaction
    #[clap(long, default_value_t = crate::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Schema layout to load into
    #[clap(long, value_enum, default_value_t = SchemaPreset::Lookups)]
    pub schema: SchemaPreset,

    /// Override: model vehicle type as a TipoVeicolo node
    #[clap(long)]
    pub vehicle_type_node: Option<bool,>,

    /// Override: model gender as a Sesso node
    #[clap(long)]
    pub gender_node: Option<bool,>,

    /// Override: model the responding group as a Gruppo node
    #[clap(long)]
    pub group_node: Option<bool,>,

    /// Rename relationship types (e.g., --rel-name occurred-on:Occorso_su)
    #[clap(long, value_parser = parse_key_val, value_delimiter = ',')]
    pub rel_name: Option<Vec<(String, String,),>,>,

    /// Encoding label of the exports
    #[clap(long, default_value = "latin1")]
    pub encoding: String,

    /// Delete every node and relationship before loading
    #[clap(long)]
    pub clear: bool,

    /// Do not create merge-key constraints before loading
    #[clap(long)]
    pub skip_constraints: bool,
}

impl LoadArgs {
    pub fn schema_config(&self,) -> Result<SchemaConfig,> {
        let mut schema = SchemaConfig::preset(self.schema,);
        if let Some(flag,) = self.vehicle_type_node {
            schema.vehicle_type = Representation::from_flag(flag,);
        }
        if let Some(flag,) = self.gender_node {
            schema.gender = Representation::from_flag(flag,);
        }
        if let Some(flag,) = self.group_node {
            schema.group = Representation::from_flag(flag,);
        }
        for (kind, name,) in self.rel_name.iter().flatten() {
            schema = schema.with_relationship_name(kind.parse::<RelKind>()?, name,)?;
        }
        Ok(schema,)
    }

    pub fn ingestor_config(&self, strict: bool,) -> Result<IngestorConfig,> {
        let encoding = encoding_rs::Encoding::for_label(self.encoding.as_bytes(),).ok_or_else(|| {
            IngestorError::ConfigurationError(format!("unknown encoding '{}'", self.encoding),)
        },)?;
        Ok(IngestorConfig {
            source: self.path.clone(),
            batch_size: self.batch_size,
            schema: self.schema_config()?,
            encoding,
            clear: self.clear,
            ensure_constraints: !self.skip_constraints,
            missing_key: if strict { MissingKeyPolicy::Reject } else { MissingKeyPolicy::Skip },
        },)
    }
}

/// Parse a single key-value pair
fn parse_key_val(s: &str,) -> std::result::Result<(String, String,), String,> {
    let pos = s
        .find(':',)
        .ok_or_else(|| format!("invalid KEY:VALUE: no `:` found in `{}`", s),)?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string(),),)
}

#[derive(Parser, Debug,)]
pub struct Neo4jArgs {
    /// Connection string for Neo4j
    #[clap(long, env = "NEO4J_URI", default_value = "bolt://localhost:7687")]
    pub uri:      String,
    /// User name, overriding the one in the URI
    #[clap(long, env = "NEO4J_USER")]
    pub user:     Option<String,>,
    /// Password, overriding the one in the URI
    #[clap(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub password: Option<String,>,
    /// Database to load into
    #[clap(long, env = "NEO4J_DATABASE")]
    pub database: Option<String,>,

    #[clap(flatten)]
    pub load: LoadArgs,
}

impl Neo4jArgs {
    pub fn connection(&self,) -> ConnectionConfig {
        ConnectionConfig {
            uri:      self.uri.clone(),
            user:     self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }
}

#[derive(Parser, Debug,)]
pub struct DryRunArgs {
    #[clap(flatten)]
    pub load: LoadArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neo4j_arguments_build_a_run_config() {
        let cli = Cli::parse_from([
            "incident-ingestor",
            "--strict",
            "neo4j",
            "--uri",
            "bolt://neo4j:secret@db:7687",
            "--path",
            "./Datasets",
            "--batch-size",
            "3",
            "--schema",
            "full",
            "--gender-node",
            "false",
            "--rel-name",
            "occurred-on:Occorso_su",
            "--clear",
        ],);
        assert!(cli.strict);
        let Commands::Neo4j(args,) = cli.command else { panic!("expected neo4j") };
        let config = args.load.ingestor_config(cli.strict,).unwrap();
        assert_eq!(config.batch_size, 3);
        assert!(config.clear);
        assert_eq!(config.missing_key, MissingKeyPolicy::Reject);
        assert!(config.schema.group.is_node());
        assert!(!config.schema.gender.is_node());
        assert_eq!(config.schema.relationship_name(RelKind::OccurredOn,), "Occorso_su");
        assert_eq!(config.encoding, encoding_rs::WINDOWS_1252);
        assert_eq!(args.connection().uri, "bolt://neo4j:secret@db:7687");
    }

    #[test]
    fn bad_relationship_names_are_configuration_errors() {
        let cli = Cli::parse_from([
            "incident-ingestor",
            "dry-run",
            "--path",
            "x",
            "--rel-name",
            "type-of:TIPO DI",
        ],);
        let Commands::DryRun(args,) = cli.command else { panic!("expected dry-run") };
        assert!(args.load.schema_config().is_err());
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let cli = Cli::parse_from(["incident-ingestor", "dry-run", "--path", "x", "--encoding", "klingon",],);
        let Commands::DryRun(args,) = cli.command else { panic!("expected dry-run") };
        assert!(args.load.ingestor_config(false,).is_err());
    }
}
