use crate::schema::{Stage, StageTranscript};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesAnalysisError {
    #[error("{0}")]
    InputError(String),

    #[error("Spreadsheet could not be decoded: {0}")]
    ParseError(String),

    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("Model response did not contain a recognizable JSON object")]
    ExtractionFailure,

    /// `snippet` holds the head of the offending text for logs; it is kept out of
    /// the display message on purpose so it never reaches an end user.
    #[error("Model response JSON could not be parsed: {message}")]
    MalformedJson { message: String, snippet: String },

    #[error("{stage} stage returned a context that breaks its contract: {details}")]
    StageContractViolation { stage: Stage, details: String },

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        completed: Box<StageTranscript>,
        #[source]
        source: Box<SalesAnalysisError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SalesAnalysisError {
    /// The innermost error, looking through `StageFailed` wrappers.
    pub fn root(&self) -> &SalesAnalysisError {
        match self {
            SalesAnalysisError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures caused by the model service or its output.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self.root(),
            SalesAnalysisError::ModelInvocation(_)
                | SalesAnalysisError::ExtractionFailure
                | SalesAnalysisError::MalformedJson { .. }
                | SalesAnalysisError::StageContractViolation { .. }
        )
    }
}

#[cfg(feature = "gemini")]
impl From<reqwest::Error> for SalesAnalysisError {
    fn from(err: reqwest::Error) -> Self {
        // The URL stays out of messages that reach callers.
        SalesAnalysisError::ModelInvocation(format!("transport error: {}", err.without_url()))
    }
}

pub type Result<T> = std::result::Result<T, SalesAnalysisError>;
