use crate::aggregation::ChartData;
use crate::config::PipelineConfig;
use crate::error::{Result, SalesAnalysisError};
use crate::ingestion::rows_from_workbook;
use crate::llm::{PipelineEvent, StageOrchestrator, TextGenerator};
use crate::schema::{AnalysisContext, Row, SalesAnalysis, Stage};
use log::{debug, info};
use tokio::sync::mpsc::Sender;

/// Fresh context for one request: header from config, empty `thinking` and `results`.
pub fn seed_context(config: &PipelineConfig) -> AnalysisContext {
    AnalysisContext::new(config.context_header())
}

/// Entry point for one analysis request.
pub struct SalesAnalysisProcessor<G> {
    orchestrator: StageOrchestrator<G>,
    config: PipelineConfig,
    progress: Option<Sender<PipelineEvent>>,
}

impl<G: TextGenerator> SalesAnalysisProcessor<G> {
    pub fn new(generator: G, config: PipelineConfig) -> Self {
        Self {
            orchestrator: StageOrchestrator::new(generator, config.generation.clone()),
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: Sender<PipelineEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parses an uploaded spreadsheet and analyses its first worksheet.
    pub async fn analyze_workbook(&self, bytes: &[u8]) -> Result<SalesAnalysis> {
        let rows = rows_from_workbook(bytes)?;
        debug!("First rows: {:?}", &rows[..rows.len().min(5)]);
        self.analyze_rows(&rows).await
    }

    /// Runs the stage pipeline and the chart aggregation side by side and joins them
    /// into one payload. Either side failing fails the whole request.
    pub async fn analyze_rows(&self, rows: &[Row]) -> Result<SalesAnalysis> {
        if rows.is_empty() {
            return Err(SalesAnalysisError::InputError(
                "Spreadsheet has no data rows".to_string(),
            ));
        }

        info!(
            "Analysing {} rows with model {}",
            rows.len(),
            self.orchestrator.model()
        );

        let seed = seed_context(&self.config);
        let (transcript, chart_data) = futures::join!(
            self.orchestrator.run(rows, seed, self.progress.as_ref()),
            async { ChartData::from_rows(rows) }
        );
        let transcript = transcript?;

        let final_context = transcript.final_context().ok_or_else(|| {
            SalesAnalysisError::StageContractViolation {
                stage: Stage::ResultGeneration,
                details: "no context was produced".to_string(),
            }
        })?;
        let report_data = final_context.report()?;

        Ok(SalesAnalysis {
            prompts: transcript.prompts,
            intermediate_results: transcript.stages,
            report_data,
            chart_data,
        })
    }
}
