use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use join_advisor::config::AdvisorConfig;
use join_advisor::introspection::{
    validate_column_references, validate_table_reference, PgSchemaIntrospector, SchemaIntrospector,
};
use join_advisor::join_catalog::{JoinDefinition, SqliteJoinCatalog};
use join_advisor::join_suggester::{JoinSuggestionEngine, JoinType};
use join_advisor::schema::TableDescriptor;
use join_advisor::sql_validator::CleaningSqlValidator;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "join-advisor")]
#[command(about = "Cross-source join suggestions and cleaning-SQL safety checks")]
struct Cli {
    /// Directory holding the join catalog (or set JOIN_CATALOG_DIR)
    #[arg(long, global = true)]
    catalog_dir: Option<PathBuf>,

    /// Postgres URL for information_schema lookups (or set DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Suggest join columns between two table descriptors (JSON files)
    Suggest {
        #[arg(long)]
        left: PathBuf,

        #[arg(long)]
        right: PathBuf,

        /// Put previously saved joins from the catalog first
        #[arg(long)]
        combined: bool,
    },

    /// Print a table descriptor read from information_schema
    Describe {
        #[arg(long)]
        source_id: i64,

        #[arg(long, default_value = "public")]
        schema: String,

        #[arg(long)]
        table: String,
    },

    /// Check AI-generated cleaning SQL; exits with status 2 when unsafe
    ValidateSql {
        /// Read SQL from this file instead of the argument
        #[arg(long)]
        file: Option<PathBuf>,

        sql: Option<String>,
    },

    /// Check that a table (and optionally columns) exist
    CheckTable {
        #[arg(long, default_value = "public")]
        schema: String,

        #[arg(long)]
        table: String,

        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Join catalog operations
    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Record an accepted join (repeat calls bump its usage count)
    Record(RecordArgs),

    /// Most used joins between two data sources, in either direction
    Popular {
        #[arg(long)]
        left_source: i64,

        #[arg(long)]
        right_source: i64,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Catalog totals by schema and confidence band
    Stats,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    left_source: i64,
    #[arg(long, default_value = "public")]
    left_schema: String,
    #[arg(long)]
    left_table: String,
    #[arg(long)]
    left_column: String,

    #[arg(long)]
    right_source: i64,
    #[arg(long, default_value = "public")]
    right_schema: String,
    #[arg(long)]
    right_table: String,
    #[arg(long)]
    right_column: String,

    #[arg(long, default_value = "INNER")]
    join_type: String,

    #[arg(long, default_value_t = 100)]
    confidence: u8,

    #[arg(long)]
    user_id: i64,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_descriptor(path: &Path) -> Result<TableDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid table descriptor in {}", path.display()))
}

fn open_engine(config: &AdvisorConfig) -> Result<JoinSuggestionEngine> {
    let catalog = SqliteJoinCatalog::open(&config.catalog_dir)?;
    Ok(JoinSuggestionEngine::new(Arc::new(catalog)).with_popular_limit(config.popular_limit))
}

async fn connect_introspector(config: &AdvisorConfig) -> Result<PgSchemaIntrospector> {
    let url = config.require_database_url()?;
    Ok(PgSchemaIntrospector::connect(url).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AdvisorConfig::from_env()?;
    if let Some(dir) = cli.catalog_dir {
        config.catalog_dir = dir;
    }
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Suggest { left, right, combined } => {
            let left = read_descriptor(&left)?;
            let right = read_descriptor(&right)?;

            let suggestions = if combined {
                open_engine(&config)?.get_combined_suggestions(&left, &right)
            } else {
                join_advisor::suggest_joins(&left, &right)
            };
            info!("{} suggestion(s)", suggestions.len());
            print_json(&suggestions)?;
        }

        Command::Describe { source_id, schema, table } => {
            let introspector = connect_introspector(&config).await?;
            let descriptor = introspector.describe_table(source_id, &schema, &table).await?;
            print_json(&descriptor)?;
        }

        Command::ValidateSql { file, sql } => {
            let sql = match (file, sql) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(sql)) => sql,
                (None, None) => anyhow::bail!("provide SQL as an argument or with --file"),
            };

            let result = CleaningSqlValidator::new().validate_cleaning_sql(&sql);
            print_json(&result)?;
            if !result.safe {
                std::process::exit(2);
            }
        }

        Command::CheckTable { schema, table, columns } => {
            let introspector = connect_introspector(&config).await?;
            let exists = validate_table_reference(&introspector, &schema, &table).await;
            let column_check = if columns.is_empty() {
                None
            } else {
                Some(validate_column_references(&introspector, &schema, &table, &columns).await)
            };

            print_json(&serde_json::json!({
                "schema": schema,
                "table": table,
                "exists": exists,
                "columns": column_check,
            }))?;
        }

        Command::Catalog(CatalogCommand::Record(args)) => {
            let join = JoinDefinition {
                left_data_source_id: args.left_source,
                left_schema: args.left_schema,
                left_table: args.left_table,
                left_column: args.left_column,
                right_data_source_id: args.right_source,
                right_schema: args.right_schema,
                right_table: args.right_table,
                right_column: args.right_column,
                join_type: args.join_type.parse::<JoinType>()?,
                confidence: args.confidence,
                created_by_user_id: args.user_id,
            };
            let entry = open_engine(&config)?.save_join_to_catalog(&join)?;
            print_json(&entry)?;
        }

        Command::Catalog(CatalogCommand::Popular { left_source, right_source, limit }) => {
            let entries = open_engine(&config)?.get_popular_joins(left_source, right_source, limit);
            print_json(&entries)?;
        }

        Command::Catalog(CatalogCommand::Stats) => {
            let stats = open_engine(&config)?.catalog_stats()?;
            print_json(&stats)?;
        }
    }

    Ok(())
}
