//! # Subgenre Match
//!
//! Classify manuscript text chunks into literary subgenres by cosine
//! similarity against a pre-embedded reference store of subgenre
//! prototypes, then aggregate the per-chunk votes into a per-document
//! summary.
//!
//! The pure ranking and aggregation logic lives in
//! [`subgenre_match_core`]; this crate adds the SQLite store, importers,
//! the Ollama embedding client, and the `sgm` command-line surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Importers   │──▶│  Embedding  │──▶│  SQLite   │
//! │ JSON / Excel │   │  (Ollama)   │   │ subgenres │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!              ┌───────────────┐     ┌──────────┐
//!              │ rank/classify │     │   HTTP   │
//!              │   (stdin →    │     │  (JSON)  │
//!              │    stdout)    │     └──────────┘
//!              └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sgm init
//! sgm import excel subgenres.xlsx
//! sgm embed pending
//! sgm classify --input chunks.jsonl
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`models`] | Subgenre interchange records |
//! | [`sqlite_store`] | SQLite reference store |
//! | [`import`] | JSON and Excel importers |
//! | [`embedding`] | Embedding providers |
//! | [`embed_cmd`] | Embedding backfill and rebuild |
//! | [`input`] | Query record parsing |
//! | [`classify`] | Per-chunk ranking and per-document classification |
//! | [`export`] | Store export |
//! | [`output`] | Result writing |
//! | [`progress`] | Progress reporting |
//! | [`server`] | JSON HTTP server |

pub mod classify;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod export;
pub mod import;
pub mod input;
pub mod migrate;
pub mod models;
pub mod output;
pub mod progress;
pub mod server;
pub mod sqlite_store;
