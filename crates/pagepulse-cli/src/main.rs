mod cli;
mod display;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use pagepulse_core::{AnalysisOptions, FieldQueryOptions, MetricsApiClient, QueryType, schema};
use pagepulse_fetch::HttpFetcher;
use pagepulse_store::{DuckStore, WriteMode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, CruxArgs, ExportArgs, ImportArgs, ProbeArgs, RunArgs, ShowArgs};

#[tokio::main]
async fn main() {
    init_tracing();
    info!("pagepulse v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = dispatch(Cli::parse()).await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Import(args) => import(&cli.db, args),
        Commands::Run(args) => run(&cli.db, args).await,
        Commands::Probe(args) => probe(args).await,
        Commands::Crux(args) => crux(args).await,
        Commands::Show(args) => show(&cli.db, args),
        Commands::Export(args) => export(&cli.db, args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(db: &std::path::Path) -> Result<DuckStore> {
    DuckStore::open_persistent(db).with_context(|| format!("opening database {}", db.display()))
}

fn import(db: &std::path::Path, args: ImportArgs) -> Result<()> {
    let store = open_store(db)?;
    let count = store
        .load_worklist(&args.path, &args.table)
        .with_context(|| format!("importing {}", args.path.display()))?;
    let worklist = store.read_worklist(&args.table)?;
    for rejected in &worklist.rejected {
        error!(row = rejected.row, error = %rejected.error, "invalid worklist row");
    }
    info!(
        rows = count,
        valid = worklist.entries.len(),
        table = %args.table,
        "worklist imported"
    );
    Ok(())
}

async fn run(db: &std::path::Path, args: RunArgs) -> Result<()> {
    let store = open_store(db)?;
    let client = MetricsApiClient::new(args.api.api_config());
    let fetcher = HttpFetcher::new(args.api.retry_policy());
    let opts = pipeline::RunOptions {
        worklist_table: &args.worklist_table,
        output_table: &args.output_table,
        mode: if args.overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Append
        },
        concurrency: args.concurrency,
        locale: &args.locale,
    };
    let stats = pipeline::run_worklist(&store, &client, &fetcher, &opts).await?;
    eprintln!(
        "{} written, {} without content, {} failed, {} invalid worklist rows",
        stats.written, stats.no_content, stats.failed, stats.rejected_rows
    );
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<()> {
    let client = MetricsApiClient::new(args.api.api_config());
    let fetcher = HttpFetcher::new(args.api.retry_policy());
    let opts = AnalysisOptions {
        query_type: &args.query_type,
        locale: &args.locale,
        strategy: &args.strategy,
        category: &args.category,
        ..Default::default()
    };
    let spec = client.build_analysis_query(&args.url, opts)?;

    let Some(body) = fetcher.execute(&spec).await? else {
        info!(url = %args.url, "no content");
        return Ok(());
    };
    if args.raw {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let response: pagepulse_core::PsiResponse =
        serde_json::from_value(body).context("decoding PSI response")?;
    let query_type: QueryType = args.query_type.parse()?;
    let record = response.into_record(&args.label, pipeline::experience_source(query_type))?;
    let batch = schema::records_to_batch(std::slice::from_ref(&record))?;
    display::print_record_card(&batch)
}

async fn crux(args: CruxArgs) -> Result<()> {
    let client = MetricsApiClient::new(args.api.api_config());
    let fetcher = HttpFetcher::new(args.api.retry_policy());
    let opts = FieldQueryOptions {
        query_type: &args.query_type,
        form_factor: args.form_factor.as_deref(),
    };
    let spec = client.build_field_query(&args.site, opts)?;
    match fetcher.execute(&spec).await? {
        Some(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        None => info!(site = %args.site, "no content"),
    }
    Ok(())
}

fn show(db: &std::path::Path, args: ShowArgs) -> Result<()> {
    let store = open_store(db)?;
    let batches = store.tail(&args.table, args.limit)?;
    arrow::util::pretty::print_batches(&batches)?;
    Ok(())
}

fn export(db: &std::path::Path, args: ExportArgs) -> Result<()> {
    let store = open_store(db)?;
    let rows = store.export(&args.table, &args.path)?;
    info!(rows, path = %args.path.display(), "export complete");
    Ok(())
}
