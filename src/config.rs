use crate::error::{Result, SalesAnalysisError};
use crate::schema::{columns, ContextHeader, SchemaInfo};
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_TASK: &str = "sales_analysis";
pub const DEFAULT_DATA_SOURCE: &str = "excel_file";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Sampling and filtering parameters sent with every stage's model call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub safety_settings: Vec<SafetySetting>,
    /// Ask the service for a bare JSON body (native structured output). The
    /// extractor still runs on the reply, so this only narrows what it has to undo.
    pub json_mode: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let categories = [
            HarmCategory::Harassment,
            HarmCategory::HateSpeech,
            HarmCategory::SexuallyExplicit,
            HarmCategory::DangerousContent,
        ];

        Self {
            temperature: 0.2,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            safety_settings: categories
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: HarmBlockThreshold::BlockMediumAndAbove,
                })
                .collect(),
            json_mode: true,
        }
    }
}

/// Everything the pipeline needs, handed in at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub generation: GenerationSettings,
    pub task: String,
    pub data_source: String,
    pub schema_fields: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            generation: GenerationSettings::default(),
            task: DEFAULT_TASK.to_string(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            schema_fields: columns::ALL.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Reads `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_BASE_URL` and
    /// `GEMINI_JSON_MODE`, after loading `.env` if one exists. This is the only
    /// place the pipeline touches the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        config.api_key = read_env("GEMINI_API_KEY");
        if let Some(model) = read_env("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = read_env("GEMINI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(flag) = read_env("GEMINI_JSON_MODE") {
            config.generation.json_mode = parse_flag("GEMINI_JSON_MODE", &flag)?;
        }

        debug!(
            "Pipeline config: model={}, json_mode={}, api_key_set={}",
            config.model,
            config.generation.json_mode,
            config.api_key.is_some()
        );

        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Header block for a fresh analysis context.
    pub fn context_header(&self) -> ContextHeader {
        ContextHeader {
            task: self.task.clone(),
            data_source: self.data_source.clone(),
            schema: SchemaInfo {
                inferred: true,
                fields: self.schema_fields.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000))),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Reads `SALES_INSIGHT_ADDR` and `SALES_INSIGHT_MAX_UPLOAD_BYTES`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Some(addr) = read_env("SALES_INSIGHT_ADDR") {
            config.bind_addr = addr.parse().map_err(|e| {
                SalesAnalysisError::Configuration(format!(
                    "SALES_INSIGHT_ADDR '{}' is not a socket address: {}",
                    addr, e
                ))
            })?;
        }
        if let Some(limit) = read_env("SALES_INSIGHT_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit.parse().map_err(|e| {
                SalesAnalysisError::Configuration(format!(
                    "SALES_INSIGHT_MAX_UPLOAD_BYTES '{}' is not a byte count: {}",
                    limit, e
                ))
            })?;
        }

        Ok(config)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SalesAnalysisError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_generation_settings() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.max_output_tokens, 8192);
        assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(settings.safety_settings.len(), 4);
        assert!(settings
            .safety_settings
            .iter()
            .all(|s| s.threshold == HarmBlockThreshold::BlockMediumAndAbove));
    }

    #[test]
    fn test_safety_setting_wire_names() {
        let setting = SafetySetting {
            category: HarmCategory::HateSpeech,
            threshold: HarmBlockThreshold::BlockMediumAndAbove,
        };
        let value = serde_json::to_value(&setting).unwrap();
        assert_eq!(value["category"], "HARM_CATEGORY_HATE_SPEECH");
        assert_eq!(value["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn test_context_header_uses_declared_fields() {
        let header = PipelineConfig::default().context_header();
        assert_eq!(header.task, "sales_analysis");
        assert_eq!(header.data_source, "excel_file");
        assert_eq!(header.schema.fields, vec!["日期", "產品", "區域", "銷售額", "客戶"]);
        assert!(header.schema.inferred);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(!parse_flag("X", "off").unwrap());
        assert!(matches!(
            parse_flag("X", "maybe"),
            Err(SalesAnalysisError::Configuration(_))
        ));
    }
}
