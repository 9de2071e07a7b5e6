//! Worklist pipeline: worklist rows → PSI analyses → flat records → metrics table.

use std::pin::pin;
use std::time::Instant;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use pagepulse_core::{
    AnalysisOptions, ExperienceSource, FlatMetricsRecord, MetricsApiClient, QueryType, Strategy,
    WorklistEntry,
};
use pagepulse_fetch::HttpFetcher;
use pagepulse_store::{DuckStore, WriteMode};
use tracing::{error, info, warn};

pub struct RunOptions<'a> {
    pub worklist_table: &'a str,
    pub output_table: &'a str,
    pub mode: WriteMode,
    pub concurrency: usize,
    pub locale: &'a str,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub observations: usize,
    pub written: usize,
    pub no_content: usize,
    pub failed: usize,
    pub rejected_rows: usize,
}

/// One (worklist entry, strategy) pair.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub entry: &'a WorklistEntry,
    pub strategy: Strategy,
}

/// Expand worklist entries into observations, in worklist order.
pub fn observations(entries: &[WorklistEntry]) -> Vec<Observation<'_>> {
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .strategy
                .strategies()
                .iter()
                .map(move |&strategy| Observation { entry, strategy })
        })
        .collect()
}

/// Loading experience matching the entry's query type.
pub fn experience_source(query_type: QueryType) -> ExperienceSource {
    match query_type {
        QueryType::Origin => ExperienceSource::Origin,
        QueryType::Url => ExperienceSource::Url,
    }
}

/// Run every worklist observation and write each record as it arrives.
///
/// A failing observation or write is logged with its brand and strategy and
/// does not stop the others. The first successful write uses `opts.mode`;
/// later ones append.
pub async fn run_worklist(
    store: &DuckStore,
    client: &MetricsApiClient,
    fetcher: &HttpFetcher,
    opts: &RunOptions<'_>,
) -> anyhow::Result<RunStats> {
    let start = Instant::now();

    let worklist = store
        .read_worklist(opts.worklist_table)
        .with_context(|| format!("reading worklist table {:?}", opts.worklist_table))?;
    let observations = observations(&worklist.entries);

    let mut stats = RunStats {
        observations: observations.len(),
        rejected_rows: worklist.rejected.len(),
        ..Default::default()
    };
    info!(
        entries = worklist.entries.len(),
        observations = stats.observations,
        concurrency = opts.concurrency,
        "starting run"
    );

    let mut outcomes = pin!(
        stream::iter(observations)
            .map(|obs| async move {
                let outcome = observe(client, fetcher, obs, opts.locale).await;
                (obs, outcome)
            })
            .buffered(opts.concurrency.max(1))
    );

    while let Some((obs, outcome)) = outcomes.next().await {
        match outcome {
            Ok(Some(record)) => {
                let mode = if stats.written == 0 {
                    opts.mode
                } else {
                    WriteMode::Append
                };
                match store.write_records(opts.output_table, std::slice::from_ref(&record), mode) {
                    Ok(n) => stats.written += n,
                    Err(e) => {
                        error!(
                            label = %obs.entry.label,
                            strategy = %obs.strategy,
                            table = opts.output_table,
                            error = %e,
                            "write failed"
                        );
                        stats.failed += 1;
                    }
                }
            }
            Ok(None) => {
                warn!(label = %obs.entry.label, url = %obs.entry.url, strategy = %obs.strategy, "no content");
                stats.no_content += 1;
            }
            Err(e) => {
                error!(
                    label = %obs.entry.label,
                    url = %obs.entry.url,
                    strategy = %obs.strategy,
                    error = %format!("{e:#}"),
                    "observation failed"
                );
                stats.failed += 1;
            }
        }
    }

    if stats.written == 0 {
        warn!(table = opts.output_table, "nothing written");
    }

    info!(
        written = stats.written,
        no_content = stats.no_content,
        failed = stats.failed,
        rejected_rows = stats.rejected_rows,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "run complete"
    );
    Ok(stats)
}

/// Fetch and assemble one observation. `Ok(None)` means the API had no content.
pub async fn observe(
    client: &MetricsApiClient,
    fetcher: &HttpFetcher,
    obs: Observation<'_>,
    locale: &str,
) -> anyhow::Result<Option<FlatMetricsRecord>> {
    let entry = obs.entry;
    info!(label = %entry.label, strategy = %obs.strategy, "requesting analysis");

    let opts = AnalysisOptions {
        query_type: entry.query_type.as_str(),
        strategy: obs.strategy.as_str(),
        locale,
        ..Default::default()
    };
    let spec = client.build_analysis_query(&entry.url, opts)?;
    let Some(response) = fetcher.run_analysis(&spec).await? else {
        return Ok(None);
    };
    let record = response.into_record(&entry.label, experience_source(entry.query_type))?;
    Ok(Some(record))
}
