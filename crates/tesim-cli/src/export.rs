//! CSV and JSON output of finished replicates.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tesim_world::{pair_totals, ReplicateResult};

pub const CSV_HEADER: [&str; 5] = ["replicate_id", "seed", "round_index", "interaction_pair", "count"];

/// Write one row per (replicate, round, tracked pair). Returns the row count.
pub fn write_records<W: Write>(writer: W, results: &[ReplicateResult]) -> Result<usize> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for result in results {
        for record in result.records() {
            csv.serialize(record)?;
            rows += 1;
        }
    }
    csv.flush()?;
    Ok(rows)
}

pub fn write_records_to(path: &Path, results: &[ReplicateResult]) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_records(BufWriter::new(file), results)
}

#[derive(Debug, Serialize)]
pub struct ReplicateSummary {
    pub replicate_id: usize,
    pub seed: u64,
    pub completed_rounds: usize,
    pub skipped_rounds: Vec<usize>,
    pub final_width: usize,
    pub mean_density: f64,
    pub interactions: u64,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub replicates: Vec<ReplicateSummary>,
    /// Counts per pair summed over all replicates, keyed as "(m, t)"
    pub totals: BTreeMap<String, u64>,
}

impl RunSummary {
    pub fn from_results(results: &[ReplicateResult]) -> Self {
        let replicates = results
            .iter()
            .map(|r| {
                let rounds = &r.result.rounds;
                let mean_density = if rounds.is_empty() {
                    0.0
                } else {
                    rounds.iter().map(|s| s.density).sum::<f64>() / rounds.len() as f64
                };
                ReplicateSummary {
                    replicate_id: r.replicate_id,
                    seed: r.seed,
                    completed_rounds: rounds.len(),
                    skipped_rounds: r.result.skipped_rounds.clone(),
                    final_width: r.result.final_width,
                    mean_density,
                    interactions: r.result.log.totals().values().sum(),
                }
            })
            .collect();

        let totals = pair_totals(results)
            .into_iter()
            .map(|(pair, count)| (pair.to_string(), count))
            .collect();

        Self { replicates, totals }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
