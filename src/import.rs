//! Reference store importers.
//!
//! Two sources feed the `subgenres` table:
//!
//! - **JSON**: a `subgenres.json` array of [`SubgenreRecord`]s, with or
//!   without embeddings.
//! - **Excel**: the master subgenre workbook. Each row of the configured
//!   sheet becomes one subgenre whose prototype text is assembled from the
//!   descriptive columns (see [`build_prototype_text`]). Embeddings are
//!   generated afterwards with `sgm embed pending`.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::SubgenreRecord;
use crate::sqlite_store::SqliteStore;

const COL_PARENT: &str = "Parent Genre";
const COL_SUB: &str = "Sub Genre";
const COL_DESCRIPTION: &str = "Short Description";
const COL_THEMES: &str = "Key Themes/Motifs";
const COL_TROPES: &str = "Common Tropes";
const COL_SYNONYMS: &str = "Synonyms";
const COL_EXEMPLAR: &str = "Exemplar Prose";

/// Optional descriptive cells of one workbook row.
#[derive(Debug, Default, Clone)]
pub struct PrototypeFields {
    pub description: Option<String>,
    pub themes: Option<String>,
    pub tropes: Option<String>,
    pub synonyms: Option<String>,
    pub exemplar: Option<String>,
}

/// Assemble the text a subgenre is embedded from.
///
/// Parts are joined with `". "`:
/// `"{parent} - {sub}"`, the description, `"Key themes: …"`,
/// `"Common tropes: …"`, `"Also known as: …"`, `"Example: …"`.
/// Missing cells are left out.
pub fn build_prototype_text(parent: &str, sub: &str, fields: &PrototypeFields) -> String {
    let mut parts = vec![format!("{} - {}", parent, sub)];

    if let Some(d) = &fields.description {
        parts.push(d.clone());
    }
    if let Some(t) = &fields.themes {
        parts.push(format!("Key themes: {}", t));
    }
    if let Some(t) = &fields.tropes {
        parts.push(format!("Common tropes: {}", t));
    }
    if let Some(s) = &fields.synonyms {
        parts.push(format!("Also known as: {}", s));
    }
    if let Some(e) = &fields.exemplar {
        parts.push(format!("Example: {}", e));
    }

    parts.join(". ")
}

/// Read a `subgenres.json` array.
pub fn read_subgenres_json(path: &Path) -> Result<Vec<SubgenreRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<SubgenreRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of subgenres", path.display()))?;

    for (i, r) in records.iter().enumerate() {
        if r.sub_genre.trim().is_empty() {
            bail!("subgenre #{} in {} has an empty sub_genre", i + 1, path.display());
        }
    }

    Ok(records)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => format!("{i}"),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERROR: {e:?}"),
        Data::DateTime(dt) => format!("{dt}"),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Convert header + data rows into subgenre records.
///
/// Fails if either required column is absent. Rows with an empty
/// `Sub Genre` are skipped.
pub fn records_from_rows(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<SubgenreRecord>> {
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let missing: Vec<&str> = [COL_PARENT, COL_SUB]
        .into_iter()
        .filter(|c| col(*c).is_none())
        .collect();
    if !missing.is_empty() {
        bail!("Missing required columns: {}", missing.join(", "));
    }
    let (parent_idx, sub_idx) = (col(COL_PARENT).unwrap_or(0), col(COL_SUB).unwrap_or(0));
    let optional = |row: &[String], name: &str| -> Option<String> {
        col(name)
            .and_then(|i| row.get(i))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut records = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let parent = row.get(parent_idx).map(|s| s.trim()).unwrap_or("");
        let sub = row.get(sub_idx).map(|s| s.trim()).unwrap_or("");
        if sub.is_empty() {
            if row.iter().any(|c| !c.trim().is_empty()) {
                tracing::warn!(row = i + 2, "skipping row without a sub genre");
            }
            continue;
        }

        let fields = PrototypeFields {
            description: optional(row, COL_DESCRIPTION),
            themes: optional(row, COL_THEMES),
            tropes: optional(row, COL_TROPES),
            synonyms: optional(row, COL_SYNONYMS),
            exemplar: optional(row, COL_EXEMPLAR),
        };
        let prototype = build_prototype_text(parent, sub, &fields);
        records.push(SubgenreRecord::new(parent, sub, &prototype));
    }

    Ok(records)
}

/// Read one sheet of a workbook into subgenre records.
pub fn read_subgenres_excel(path: &Path, sheet: &str) -> Result<Vec<SubgenreRecord>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    if !workbook.sheet_names().iter().any(|s| s == sheet) {
        bail!(
            "Sheet '{}' not found in {} (available: {})",
            sheet,
            path.display(),
            workbook.sheet_names().join(", ")
        );
    }

    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(first) => first.iter().map(cell_to_string).collect(),
        None => bail!("Sheet '{}' is empty", sheet),
    };
    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    records_from_rows(&headers, &rows)
}

/// Insert `records`; returns `(inserted, rows now in the store)`.
async fn store_records(
    config: &Config,
    records: &[SubgenreRecord],
    replace: bool,
) -> Result<(u64, i64)> {
    migrate::run_migrations(config).await?;
    let store = SqliteStore::new(db::connect(config).await?);
    let model = config.embedding.model.as_deref();
    let result = match store.insert_records(records, replace, model).await {
        Ok(inserted) => store.count().await.map(|total| (inserted, total)),
        Err(e) => Err(e),
    };
    store.close().await;
    result
}

pub async fn run_import_json(config: &Config, path: &Path, replace: bool) -> Result<()> {
    let records = read_subgenres_json(path)?;
    let with_embeddings = records.iter().filter(|r| r.embedding.is_some()).count();
    let (inserted, total) = store_records(config, &records, replace).await?;

    println!("import json");
    println!("  file: {}", path.display());
    println!("  imported subgenres: {}", inserted);
    println!("  with embeddings: {}", with_embeddings);
    println!("  subgenres in store: {}", total);
    Ok(())
}

pub async fn run_import_excel(
    config: &Config,
    path: &Path,
    sheet: Option<&str>,
    replace: bool,
) -> Result<()> {
    let sheet = sheet.unwrap_or(&config.import.sheet);
    let records = read_subgenres_excel(path, sheet)?;
    let (inserted, total) = store_records(config, &records, replace).await?;

    println!("import excel");
    println!("  file: {}", path.display());
    println!("  sheet: {}", sheet);
    println!("  imported subgenres: {}", inserted);
    println!("  subgenres in store: {}", total);
    if let Some(first) = records.first() {
        let preview: String = first.prototype_text.chars().take(150).collect();
        println!("  example prototype: {}...", preview);
    }
    println!("  next: sgm embed pending");
    Ok(())
}
