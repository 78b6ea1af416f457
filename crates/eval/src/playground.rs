use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use index::{Index, IndexKind, QueryMode, TokenUsage};
use ingest::Document;
use llm::ServiceContext;
use query::AsQueryEngine;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaygroundError {
    #[error("Playground must have a non-empty list of indices.")]
    EmptyIndices,

    #[error("Playground must have a non-empty list of index kinds.")]
    EmptyIndexKinds,

    #[error("Unsupported index: {0}")]
    UnsupportedIndex(String),

    #[error("Playground indices must be of distinct kinds; {0} appears more than once.")]
    DuplicateIndexKind(IndexKind),

    #[error("Playground must have a non-empty list of modes.")]
    EmptyModes,

    #[error("Unknown query mode: {0}")]
    UnknownMode(String),

    #[error("Playground modes must be a list of names, got: {0}")]
    ModesNotSequence(String),
}

/// Resolve index kind names against the supported set
pub fn parse_index_kinds<S: AsRef<str>>(names: &[S]) -> Result<Vec<IndexKind>, PlaygroundError> {
    let kinds = names
        .iter()
        .map(|name| {
            name.as_ref()
                .parse::<IndexKind>()
                .map_err(|_| PlaygroundError::UnsupportedIndex(name.as_ref().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_kinds(&kinds)?;
    Ok(kinds)
}

/// Resolve mode names against the mode registry
pub fn parse_modes<S: AsRef<str>>(names: &[S]) -> Result<Vec<QueryMode>, PlaygroundError> {
    let modes = names
        .iter()
        .map(|name| {
            name.as_ref()
                .parse::<QueryMode>()
                .map_err(|_| PlaygroundError::UnknownMode(name.as_ref().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_modes(&modes)?;
    Ok(modes)
}

/// Modes from untyped configuration; anything but an array of strings is rejected
pub fn modes_from_value(value: &serde_json::Value) -> Result<Vec<QueryMode>, PlaygroundError> {
    let items = value
        .as_array()
        .ok_or_else(|| PlaygroundError::ModesNotSequence(value.to_string()))?;

    let names = items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| PlaygroundError::UnknownMode(item.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    parse_modes(names.as_slice())
}

fn validate_kinds(kinds: &[IndexKind]) -> Result<(), PlaygroundError> {
    if kinds.is_empty() {
        return Err(PlaygroundError::EmptyIndexKinds);
    }

    let mut seen = HashSet::new();
    for kind in kinds {
        if !seen.insert(*kind) {
            return Err(PlaygroundError::DuplicateIndexKind(*kind));
        }
    }
    Ok(())
}

fn validate_indices(indices: &[Index]) -> Result<(), PlaygroundError> {
    if indices.is_empty() {
        return Err(PlaygroundError::EmptyIndices);
    }

    let kinds: Vec<IndexKind> = indices.iter().map(Index::kind).collect();
    validate_kinds(&kinds)
}

fn validate_modes(modes: &[QueryMode]) -> Result<(), PlaygroundError> {
    if modes.is_empty() {
        return Err(PlaygroundError::EmptyModes);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Records,
}

/// What one (index, mode) cell produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum CellOutcome {
    Answered(String),
    Failed(String),
}

impl CellOutcome {
    pub fn text(&self) -> &str {
        match self {
            CellOutcome::Answered(text) | CellOutcome::Failed(text) => text,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CellOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRecord {
    pub index: IndexKind,
    pub mode: QueryMode,
    pub outcome: CellOutcome,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub usage: TokenUsage,
}

fn serialize_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonTable {
    records: Vec<ComparisonRecord>,
}

impl ComparisonTable {
    pub fn records(&self) -> &[ComparisonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ComparisonRecord> {
        self.records
    }
}

impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "| Index | Mode | Output | Duration | LLM Tokens | Embedding Tokens |")?;
        writeln!(f, "|-------|------|--------|----------|------------|------------------|")?;

        for record in &self.records {
            let output = record
                .outcome
                .text()
                .replace('|', "\\|")
                .replace('\n', " ");
            let output = match &record.outcome {
                CellOutcome::Answered(_) => output,
                CellOutcome::Failed(_) => format!("ERROR: {}", output),
            };

            writeln!(
                f,
                "| {} | {} | {} | {:.3}s | {} | {} |",
                record.index,
                record.mode,
                output,
                record.elapsed.as_secs_f64(),
                record.usage.llm_tokens,
                record.usage.embedding_tokens,
            )?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ComparisonOutput {
    Table(ComparisonTable),
    Records(Vec<ComparisonRecord>),
}

impl ComparisonOutput {
    pub fn records(&self) -> &[ComparisonRecord] {
        match self {
            ComparisonOutput::Table(table) => table.records(),
            ComparisonOutput::Records(records) => records,
        }
    }
}

/// Runs every index against every mode for one query and tabulates the answers
pub struct Playground {
    indices: Vec<Index>,
    modes: Vec<QueryMode>,
}

impl Playground {
    pub fn new(indices: Vec<Index>, modes: Vec<QueryMode>) -> Result<Self, PlaygroundError> {
        validate_indices(&indices)?;
        validate_modes(&modes)?;

        Ok(Self { indices, modes })
    }

    /// Every registered mode
    pub fn with_default_modes(indices: Vec<Index>) -> Result<Self, PlaygroundError> {
        Self::new(indices, QueryMode::ALL.to_vec())
    }

    /// One index of every supported kind over `documents`, every registered mode
    pub async fn from_docs(documents: &[Document], service_context: &ServiceContext) -> Result<Self> {
        Self::from_docs_with(documents, service_context, &IndexKind::ALL, QueryMode::ALL.to_vec()).await
    }

    /// One index per kind in `index_kinds`, all built over the same `documents`
    pub async fn from_docs_with(
        documents: &[Document],
        service_context: &ServiceContext,
        index_kinds: &[IndexKind],
        modes: Vec<QueryMode>,
    ) -> Result<Self> {
        // Validate before building any index
        validate_kinds(index_kinds)?;
        validate_modes(&modes)?;

        let mut indices = Vec::with_capacity(index_kinds.len());
        for &kind in index_kinds {
            indices.push(Index::from_documents(kind, documents, service_context).await?);
        }

        Ok(Self::new(indices, modes)?)
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn modes(&self) -> &[QueryMode] {
        &self.modes
    }

    /// Replace the indices; on error the playground is left unchanged
    pub fn set_indices(&mut self, indices: Vec<Index>) -> Result<(), PlaygroundError> {
        validate_indices(&indices)?;
        self.indices = indices;
        Ok(())
    }

    /// Replace the modes; on error the playground is left unchanged
    pub fn set_modes(&mut self, modes: Vec<QueryMode>) -> Result<(), PlaygroundError> {
        validate_modes(&modes)?;
        self.modes = modes;
        Ok(())
    }

    /// Query every (index, mode) pair in order. Modes an index does not support
    /// are skipped; a failing cell is recorded and the run carries on.
    pub async fn compare(&self, query: &str, format: OutputFormat) -> ComparisonOutput {
        info!(query, indices = self.indices.len(), modes = self.modes.len(), "Comparing indices");

        let mut records = Vec::new();

        for index in &self.indices {
            for &mode in &self.modes {
                let engine = match index.as_query_engine(mode) {
                    Ok(engine) => engine,
                    Err(_) => {
                        debug!(index = %index.kind(), %mode, "Mode not supported, skipping");
                        continue;
                    }
                };

                let start = Instant::now();
                let result = engine.query(query).await;
                let elapsed = start.elapsed();

                let (outcome, usage) = match result {
                    Ok(response) => (CellOutcome::Answered(response.to_string()), response.usage),
                    Err(e) => (CellOutcome::Failed(format!("{:#}", e)), TokenUsage::default()),
                };

                info!(
                    index = %index.kind(),
                    %mode,
                    elapsed_ms = elapsed.as_millis() as u64,
                    failed = outcome.is_failed(),
                    output = outcome.text(),
                    "Ran combination"
                );

                records.push(ComparisonRecord {
                    index: index.kind(),
                    mode,
                    outcome,
                    elapsed,
                    usage,
                });
            }
        }

        info!("Ran {} combinations in total.", records.len());

        match format {
            OutputFormat::Table => ComparisonOutput::Table(ComparisonTable { records }),
            OutputFormat::Records => ComparisonOutput::Records(records),
        }
    }
}
