//! # Sales Insight Pipeline
//!
//! Turns a sales spreadsheet into an analytical report by walking a large language
//! model through three prompting stages, plus chart-ready aggregates computed directly
//! from the rows.
//!
//! ## Core Concepts
//!
//! - **Analysis context**: one JSON object (`context` header, open `thinking` and
//!   `results` sections) threaded through every stage. Each stage sees the context the
//!   previous stage produced.
//! - **Stages**: data understanding → analytical reasoning → result generation, strictly
//!   in order. A failure anywhere aborts the request.
//! - **Extraction**: model replies are free text; the JSON object inside is recovered
//!   from fenced blocks, bare objects or surrounding prose.
//! - **Stage contract**: each reply is validated and merged before it becomes the next
//!   stage's input, so findings are never silently dropped.
//! - **Chart data**: region/product totals, region×product scatter and a per-product
//!   daily time series, independent of the model.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_insight_pipeline::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let client = GeminiClient::from_config(&config)?;
//! let processor = SalesAnalysisProcessor::new(client, config);
//!
//! let bytes = std::fs::read("sales.xlsx")?;
//! let analysis = processor.analyze_workbook(&bytes).await?;
//! println!("{}", analysis.report_data.summary);
//! ```

pub mod aggregation;
pub mod config;
pub mod contract;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod schema;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;

pub use aggregation::{aggregate_rows, ChartData};
pub use config::{GenerationSettings, PipelineConfig, ServerConfig};
pub use contract::{accept_stage_output, AcceptedStage};
pub use error::{Result, SalesAnalysisError};
pub use ingestion::rows_from_workbook;
pub use llm::{extract_json, PipelineEvent, StageOrchestrator, TextGenerator};
pub use pipeline::{seed_context, SalesAnalysisProcessor};
pub use schema::*;

#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
