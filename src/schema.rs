use crate::aggregation::ChartData;
use crate::utils::{value_as_amount, value_as_text};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Column headers the pipeline understands. The dataset and every model-facing
/// field name use Traditional Chinese.
pub mod columns {
    pub const DATE: &str = "日期";
    pub const PRODUCT: &str = "產品";
    pub const REGION: &str = "區域";
    pub const SALES_AMOUNT: &str = "銷售額";
    pub const CUSTOMER: &str = "客戶";

    pub const ALL: [&str; 5] = [DATE, PRODUCT, REGION, SALES_AMOUNT, CUSTOMER];
}

/// One spreadsheet record keyed by header text. Missing cells are missing keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: Map<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.cells.insert(column.into(), value);
    }

    /// Builder-style insert, handy when assembling rows by hand.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    /// Cell rendered as non-blank text, or `None` when absent, null or blank.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(value_as_text)
    }

    /// Sales amount of this row, if present and numeric.
    pub fn amount(&self) -> Option<f64> {
        self.get(columns::SALES_AMOUNT).and_then(value_as_amount)
    }

    pub fn cells(&self) -> &Map<String, Value> {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(cells: Map<String, Value>) -> Self {
        Self { cells }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DataUnderstanding,
    AnalyticalReasoning,
    ResultGeneration,
}

impl Stage {
    /// Execution order. The pipeline never skips or reorders these.
    pub const ALL: [Stage; 3] = [
        Stage::DataUnderstanding,
        Stage::AnalyticalReasoning,
        Stage::ResultGeneration,
    ];

    /// Name used in prompts, logs and the response payload.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::DataUnderstanding => "數據理解",
            Stage::AnalyticalReasoning => "分析推理",
            Stage::ResultGeneration => "結果產生",
        }
    }

    /// Role the model is asked to play during this stage.
    pub fn role(&self) -> &'static str {
        match self {
            Stage::DataUnderstanding => "數據分析師",
            Stage::AnalyticalReasoning => "銷售策略分析顧問",
            Stage::ResultGeneration => "商業策略顧問",
        }
    }

    pub fn number(&self) -> usize {
        match self {
            Stage::DataUnderstanding => 1,
            Stage::AnalyticalReasoning => 2,
            Stage::ResultGeneration => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub inferred: bool,
    pub fields: Vec<String>,
}

/// The fixed block describing what is being analysed. Set once before stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHeader {
    pub task: String,
    pub data_source: String,
    pub schema: SchemaInfo,
}

/// The shared object threaded through every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub context: ContextHeader,
    #[serde(default)]
    pub thinking: Map<String, Value>,
    #[serde(default)]
    pub results: Map<String, Value>,
}

impl AnalysisContext {
    pub fn new(header: ContextHeader) -> Self {
        Self {
            context: header,
            thinking: Map::new(),
            results: Map::new(),
        }
    }

    pub fn to_pretty_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strictly typed view of `results`. Fails unless every required report
    /// field is present with the right shape.
    pub fn report(&self) -> std::result::Result<SalesReport, serde_json::Error> {
        serde_json::from_value(Value::Object(self.results.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    #[serde(rename = "建議")]
    #[schemars(description = "具體建議")]
    pub recommendation: String,

    #[serde(rename = "步驟")]
    #[schemars(description = "實施步驟，依執行順序排列")]
    pub steps: Vec<String>,
}

/// The final report, i.e. the `results` section after the result-generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesReport {
    #[serde(rename = "總結")]
    #[schemars(description = "整體分析總結，200字以內")]
    pub summary: String,

    #[serde(rename = "重點見解")]
    #[schemars(description = "3-5個重點見解，按重要性排序")]
    pub insights: Vec<String>,

    #[serde(rename = "建議")]
    #[schemars(description = "3-5個具體建議，每個建議包含實施步驟")]
    pub recommendations: Vec<Recommendation>,

    #[serde(rename = "策略影響")]
    #[schemars(description = "這些發現對業務策略的影響")]
    pub strategic_impact: String,

    #[serde(rename = "未來機會")]
    #[schemars(description = "基於數據識別的未來增長機會")]
    pub future_opportunities: String,

    /// Anything else the model put in `results`, kept verbatim.
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRecord {
    pub stage: Stage,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub result: AnalysisContext,
    /// False when the model rewrote the `context` header block during this stage.
    #[serde(skip)]
    pub header_preserved: bool,
}

/// Everything the orchestrator produced so far, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTranscript {
    pub prompts: Vec<PromptRecord>,
    pub stages: Vec<StageRecord>,
}

impl StageTranscript {
    pub fn final_context(&self) -> Option<&AnalysisContext> {
        self.stages.last().map(|record| &record.result)
    }
}

/// Successful response payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesAnalysis {
    pub prompts: Vec<PromptRecord>,
    pub intermediate_results: Vec<StageRecord>,
    pub report_data: SalesReport,
    pub chart_data: ChartData,
}
