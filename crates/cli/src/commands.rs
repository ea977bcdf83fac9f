//! Command dispatch.
//!
//! Every command runs against an already-constructed [`Client`], so the same
//! code drives the native transport and the in-memory one used in tests.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use client::{CancelFlag, Client};
use protocol::{QueryOptions, ResultList, Transport};
use tracing::{info, warn};

use crate::args::{Command, SearchArgs};
use crate::config::{Config, PresetError};
use crate::output;

/// The query a `search` invocation resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub terms: String,
    pub options: QueryOptions,
}

/// Combines the command line, the configured defaults and an optional preset
/// into the query to send.
pub fn plan_search(args: &SearchArgs, config: &Config) -> Result<SearchPlan, PresetError> {
    let typed = args.joined_terms();
    let (terms, preset_regex) = match &args.preset {
        Some(name) => {
            let preset = config.preset(name)?;
            (preset.expand(&typed)?, preset.is_regex)
        }
        None => (typed, config.search.is_regex),
    };

    let options = QueryOptions::new()
        .result_offset(args.offset)
        .max_results(args.max_results.unwrap_or(config.search.max_results))
        .regex(args.regex || preset_regex)
        .match_path(args.match_path)
        .match_case(args.match_case)
        .match_whole_word(args.whole_word)
        .match_accents(args.match_accents);

    Ok(SearchPlan { terms, options })
}

/// Runs `plan` on a blocking thread and cancels it cooperatively if
/// `interrupt` completes first.
pub async fn run_search<T, F>(client: Arc<Client<T>>, plan: SearchPlan, interrupt: F) -> Result<ResultList>
where
    T: Transport + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let cancel = CancelFlag::new();
    let mut source = cancel.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        client.query_cancellable(&plan.terms, &plan.options, &mut source)
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        () = interrupt => {
            info!("Interrupted, cancelling the search");
            cancel.cancel();
            task.await
        }
    };
    Ok(joined.context("search task panicked")??)
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; searches cannot be interrupted");
        std::future::pending::<()>().await;
    }
}

pub async fn dispatch<T, W>(
    client: Arc<Client<T>>,
    command: Command,
    config: &Config,
    out: &mut W,
) -> Result<()>
where
    T: Transport + Send + Sync + 'static,
    W: Write,
{
    match command {
        Command::Search(args) => {
            let plan = plan_search(&args, config)?;
            let list = run_search(client, plan, ctrl_c()).await?;
            output::write_results(out, &list, args.json, args.stats)
        }
        Command::Version { json } => {
            let version = client.get_version()?;
            output::write_version(out, version, json)
        }
        Command::Show => Ok(client.show()?),
        Command::RebuildDb => {
            let version = client.get_version()?;
            if !version.supports_rebuild_db() {
                warn!(%version, "Service versions before 1.4 ignore the rebuild request");
            }
            client.rebuild_db()?;
            info!("Index rebuild requested");
            Ok(())
        }
    }
}
