use crate::config::GenerationSettings;
use crate::contract::accept_stage_output;
use crate::error::{Result, SalesAnalysisError};
use crate::llm::extractor::extract_json_detailed;
use crate::llm::prompts::build_stage_prompt;
use crate::llm::TextGenerator;
use crate::schema::{AnalysisContext, PromptRecord, Row, Stage, StageRecord, StageTranscript};
use log::{error, info};
use serde::Serialize;
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineEvent {
    StageStarted { stage: Stage },
    AwaitingModel { stage: Stage, prompt_chars: usize },
    ResponseReceived { stage: Stage, response_chars: usize },
    StageCompleted { stage: Stage },
    Failed { stage: Stage, reason: String },
}

/// Runs the three stages in order, each one feeding the next.
pub struct StageOrchestrator<G> {
    generator: G,
    settings: GenerationSettings,
}

impl<G: TextGenerator> StageOrchestrator<G> {
    pub fn new(generator: G, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Drives every stage from `seed`. Any failure aborts the run; the returned
    /// `StageFailed` error carries the stage and the transcript completed before it.
    pub async fn run(
        &self,
        rows: &[Row],
        seed: AnalysisContext,
        progress: Option<&Sender<PipelineEvent>>,
    ) -> Result<StageTranscript> {
        let mut transcript = StageTranscript::default();
        let mut current = seed;

        for stage in Stage::ALL {
            send_event(progress, PipelineEvent::StageStarted { stage }).await;

            match self
                .run_stage(stage, rows, &current, &mut transcript, progress)
                .await
            {
                Ok(record) => {
                    current = record.result.clone();
                    transcript.stages.push(record);
                    info!("{} stage completed", stage);
                    send_event(progress, PipelineEvent::StageCompleted { stage }).await;
                }
                Err(e) => {
                    error!("{} stage failed: {}", stage, e);
                    send_event(
                        progress,
                        PipelineEvent::Failed {
                            stage,
                            reason: e.to_string(),
                        },
                    )
                    .await;
                    return Err(SalesAnalysisError::StageFailed {
                        stage,
                        completed: Box::new(transcript),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(transcript)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        rows: &[Row],
        current: &AnalysisContext,
        transcript: &mut StageTranscript,
        progress: Option<&Sender<PipelineEvent>>,
    ) -> Result<StageRecord> {
        info!("Starting {} stage ({}/{})", stage, stage.number(), Stage::ALL.len());

        let prompt = build_stage_prompt(stage, rows, current)?;
        transcript.prompts.push(PromptRecord {
            stage,
            prompt: prompt.clone(),
        });

        send_event(
            progress,
            PipelineEvent::AwaitingModel {
                stage,
                prompt_chars: prompt.chars().count(),
            },
        )
        .await;

        let raw = self.generator.generate(&prompt, &self.settings).await?;

        send_event(
            progress,
            PipelineEvent::ResponseReceived {
                stage,
                response_chars: raw.chars().count(),
            },
        )
        .await;

        let extracted = extract_json_detailed(&raw)?;
        let accepted = accept_stage_output(stage, current, extracted.value)?;

        Ok(StageRecord {
            stage,
            result: accepted.context,
            header_preserved: accepted.header_preserved,
        })
    }
}

async fn send_event(sender: Option<&Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}
