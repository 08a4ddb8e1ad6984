//! `sgm rank` and `sgm classify`.
//!
//! Both commands load the reference store once, read query records from a
//! file or stdin, and rank every chunk against the store:
//!
//! - `rank` emits one [`ChunkRanking`] per chunk.
//! - `classify` groups chunks by document title (first-appearance order)
//!   and emits one [`DocumentSummary`] per document.
//!
//! Nothing is written until every chunk has been ranked; the first fatal
//! error aborts the run with no partial output.

use anyhow::Result;
use std::path::Path;

use crate::config::{Config, MalformedPolicy};
use crate::db;
use crate::input::{self, UNKNOWN_TITLE};
use crate::output;
use crate::progress::{ProgressReporter, Stage};
use crate::sqlite_store::SqliteStore;
use subgenre_match_core::aggregate::Aggregator;
use subgenre_match_core::models::{ChunkRanking, DocumentSummary, QueryRecord, ReferenceEntry};
use subgenre_match_core::rank::rank_top;
use subgenre_match_core::store::ReferenceStore;
use subgenre_match_core::{truncate_chars, MatchError, RANK_TEXT_CHARS};

/// Options shared by `rank` and `classify`.
pub struct RunOptions<'a> {
    pub input: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub skip_malformed: bool,
}

impl RunOptions<'_> {
    fn policy(&self, config: &Config) -> MalformedPolicy {
        if self.skip_malformed {
            MalformedPolicy::Skip
        } else {
            config.input.on_malformed
        }
    }
}

/// Load every reference entry from the configured database.
pub async fn load_references(config: &Config) -> Result<Vec<ReferenceEntry>, MatchError> {
    let store = SqliteStore::new(db::connect_existing(config).await?);
    let references = store.load_references().await;
    store.close().await;

    let references = references?;
    if references.is_empty() {
        tracing::warn!(db = %config.db.path.display(), "reference store is empty");
    } else {
        tracing::info!(count = references.len(), "loaded reference entries");
    }
    Ok(references)
}

/// Rank each record against `references`, in input order.
pub fn rank_records(
    references: &[ReferenceEntry],
    records: &[QueryRecord],
    progress: &dyn ProgressReporter,
) -> Result<Vec<ChunkRanking>, MatchError> {
    let total = records.len() as u64;
    let mut rankings = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let top_matches = rank_top(&record.vector, references)?;
        rankings.push(ChunkRanking {
            document_title: record.document_title.clone(),
            chunk_index: record.chunk_index,
            chunk_text: truncate_chars(&record.chunk_text, RANK_TEXT_CHARS).to_string(),
            top_matches,
        });
        progress.tick(Stage::Ranking, i as u64 + 1, total);
    }

    Ok(rankings)
}

/// Rank each record and aggregate the votes per document.
///
/// Documents come out in the order their title first appears. An empty
/// record list still yields one summary, titled `"Unknown"`, with zero
/// chunks.
pub fn classify_records(
    references: &[ReferenceEntry],
    records: &[QueryRecord],
    progress: &dyn ProgressReporter,
) -> Result<Vec<DocumentSummary>, MatchError> {
    if records.is_empty() {
        return Ok(vec![Aggregator::new(UNKNOWN_TITLE).finish()]);
    }

    let total = records.len() as u64;
    let mut documents: Vec<Aggregator> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let matches = rank_top(&record.vector, references)?;

        let pos = match documents
            .iter()
            .position(|d| d.document_title() == record.document_title)
        {
            Some(pos) => pos,
            None => {
                documents.push(Aggregator::new(record.document_title.as_str()));
                documents.len() - 1
            }
        };
        documents[pos].push(record.chunk_index, &record.chunk_text, matches);

        progress.tick(Stage::Ranking, i as u64 + 1, total);
    }

    Ok(documents.into_iter().map(Aggregator::finish).collect())
}

async fn prepare(
    config: &Config,
    opts: &RunOptions<'_>,
) -> Result<(Vec<ReferenceEntry>, Vec<QueryRecord>)> {
    let references = load_references(config).await?;
    let text = input::read_input(opts.input)?;
    let parsed = input::parse_query_records(&text, opts.policy(config))?;
    if parsed.skipped > 0 {
        tracing::warn!(skipped = parsed.skipped, "dropped malformed query records");
    }
    Ok((references, parsed.records))
}

pub async fn run_rank(
    config: &Config,
    opts: &RunOptions<'_>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let (references, records) = prepare(config, opts).await?;
    let rankings = rank_records(&references, &records, progress)?;
    output::emit(&output::to_json_lines(&rankings)?, opts.output)
}

pub async fn run_classify(
    config: &Config,
    opts: &RunOptions<'_>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let (references, records) = prepare(config, opts).await?;
    let summaries = classify_records(&references, &records, progress)?;
    output::emit(&output::to_json_lines(&summaries)?, opts.output)
}
