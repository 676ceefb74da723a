use anyhow::Context;
use sales_insight_pipeline::server::serve;
use sales_insight_pipeline::{GeminiClient, PipelineConfig, SalesAnalysisProcessor, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let pipeline_config = PipelineConfig::from_env().context("loading pipeline configuration")?;
    let server_config = ServerConfig::from_env().context("loading server configuration")?;

    let client =
        GeminiClient::from_config(&pipeline_config).context("creating the Gemini client")?;
    let processor = SalesAnalysisProcessor::new(client, pipeline_config);

    serve(processor, server_config).await?;
    Ok(())
}
