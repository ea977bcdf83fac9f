//! Rendering of command results to stdout.

use std::io::Write;

use anyhow::Result;
use protocol::{ResultEntry, ResultList, ServiceVersion};
use serde::Serialize;

/// Result counts reported by the service alongside the items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total_items: u32,
    pub total_folders: u32,
    pub total_files: u32,
    pub returned_items: u32,
    pub offset: u32,
}

impl Totals {
    pub fn of(list: &ResultList) -> Self {
        list.header()
            .map(|h| Self {
                total_items: h.total_items,
                total_folders: h.total_folders,
                total_files: h.total_files,
                returned_items: h.available_items,
                offset: h.offset,
            })
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct SearchReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    totals: Option<Totals>,
    results: Vec<ResultEntry>,
}

pub fn write_results<W: Write>(out: &mut W, list: &ResultList, json: bool, stats: bool) -> Result<()> {
    if json {
        let report = SearchReport {
            totals: stats.then(|| Totals::of(list)),
            results: list.iter().collect(),
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    for entry in list {
        writeln!(out, "{}", entry.full_path)?;
    }
    if stats {
        let totals = Totals::of(list);
        writeln!(
            out,
            "{} of {} results from offset {} ({} folders, {} files in total)",
            totals.returned_items,
            totals.total_items,
            totals.offset,
            totals.total_folders,
            totals.total_files
        )?;
    }
    Ok(())
}

pub fn write_version<W: Write>(out: &mut W, version: ServiceVersion, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, &version)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{version}")?;
    }
    Ok(())
}
