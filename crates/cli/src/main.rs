use crate::error::CliError;
use clap::Parser;
use commands::Commands;
use connectors::{adapter::Adapter, config::ConnectionConfig};
use model::catalog::Catalog;
use planner::{
    driver::InsertResult,
    plan::Query,
    query::dialect::DialectKind,
    tree::MutationKind,
};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

#[derive(Parser)]
#[command(
    name = "rtds",
    version = "0.1.0",
    about = "Compile query descriptions to SQL and materialize nested results"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sql {
            query,
            dialect,
            schema,
            filter,
            pks,
        } => {
            let query = load_query(&query, filter.as_deref(), pks).await?;
            let dialect = dialect
                .parse::<DialectKind>()
                .map_err(CliError::InvalidDialect)?
                .dialect();
            let catalog: Catalog = serde_json::from_str(&tokio::fs::read_to_string(&schema).await?)?;

            let statement = query.select_sql_with(dialect.as_ref(), &catalog)?;
            println!("{}", statement.sql);
            if !statement.params.is_empty() {
                print_json(&Value::Array(statement.params))?;
            }
        }
        Commands::Formula { query } => {
            let query = load_query(&query, None, false).await?;
            let formula = serde_json::to_value(query.formula()?).map_err(CliError::JsonSerialize)?;
            print_json(&formula)?;
        }
        Commands::Tree { query } => {
            let query = load_query(&query, None, false).await?;
            println!("{}", query.tree().dump());
        }
        Commands::Select {
            query,
            url,
            filter,
            pks,
        } => {
            let query = load_query(&query, filter.as_deref(), false).await?;
            let adapter = Adapter::connect(&ConnectionConfig::from_url(&url)?).await?;
            let driver = adapter.as_driver();

            if pks {
                let keys = query.all_pks(driver).await?;
                print_json(&serde_json::to_value(keys).map_err(CliError::JsonSerialize)?)?;
            } else {
                let objects = query.select(driver).await?;
                info!(count = objects.len(), "Fetched objects");
                print_json(&Value::Array(objects))?;
            }
        }
        Commands::Mutate { query, data, url } => {
            let query = load_query(&query, None, false).await?;
            let payload: Value = serde_json::from_str(&tokio::fs::read_to_string(&data).await?)?;
            let adapter = Adapter::connect(&ConnectionConfig::from_url(&url)?).await?;
            let result = mutate(&query, adapter, &payload).await?;
            print_json(&result)?;
        }
    }

    Ok(())
}

async fn load_query(path: &str, filter: Option<&str>, pks: bool) -> Result<Query, CliError> {
    let source = tokio::fs::read_to_string(path).await?;
    let mut query = Query::from_json(&source)?;
    if let Some(condition) = filter {
        query = query.with_filter(condition)?;
    }
    if pks {
        query = query.select_pks();
    }
    Ok(query)
}

async fn mutate(query: &Query, adapter: Adapter, payload: &Value) -> Result<Value, CliError> {
    let driver = adapter.as_driver();
    let Some((kind, _)) = query.tree().mutation() else {
        return Err(CliError::NotAMutation);
    };

    let result = match kind {
        MutationKind::Insert => match query.create(driver, payload).await? {
            InsertResult::Done => json!({"inserted": true}),
            InsertResult::Rows(rows) => json!({"inserted": rows}),
        },
        MutationKind::Update => json!({"updated": query.update(driver, payload).await?}),
        MutationKind::Delete => json!({"deleted": query.delete(driver, payload).await?}),
    };
    Ok(result)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(CliError::JsonSerialize)?;
    println!("{json}");
    Ok(())
}
