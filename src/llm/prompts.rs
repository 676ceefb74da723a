// Stage templates for the 3-stage sales analysis pipeline.
//
// Every template ends with the same output contract: reply with one JSON object that is
// the complete updated context, written entirely in Traditional Chinese. The extractor
// and the stage contract both depend on it.

use crate::error::Result;
use crate::schema::{AnalysisContext, Row, SalesReport, Stage};
use serde_json::{Map, Value};

/// Rows shown to the model in the data-understanding stage.
pub const MAX_EXCERPT_ROWS: usize = 20;
/// Columns kept per excerpt row.
pub const MAX_EXCERPT_COLUMNS: usize = 10;

const OUTPUT_CONTRACT: &str = r#"
## 輸出規則（必須遵守）
- 僅返回一個 JSON 物件，內容為更新後的完整上下文，不要加入任何其他說明文字。
- 必須保留 "context" 區塊的原始內容，不得修改。
- 保留 "thinking" 中既有的所有鍵與內容，只能新增鍵。
- 所有內容、標籤與字段名稱一律使用繁體中文，不使用英文或拼音。
"#;

pub fn role_preamble(role_description: &str) -> String {
    format!(
        r#"# 角色扮演指導

您現在是一位專業的{role}。您的任務是提供深入、專業且有洞察力的分析。
- 使用專業的語言和術語
- 聚焦重點數據的變化趨勢與模式
- 提供具有實用性的見解和建議
- 確保分析具有邏輯性和可行性
- 所有回應、標籤和字段名稱都必須使用繁體中文

請基於以下資訊進行您的專業分析：
"#,
        role = role_description
    )
}

/// First [`MAX_EXCERPT_ROWS`] rows, each cut to its first [`MAX_EXCERPT_COLUMNS`]
/// columns, as pretty JSON.
pub fn data_excerpt(rows: &[Row]) -> Result<String> {
    let limited: Vec<Map<String, Value>> = rows
        .iter()
        .take(MAX_EXCERPT_ROWS)
        .map(|row| {
            row.cells()
                .iter()
                .take(MAX_EXCERPT_COLUMNS)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .collect();

    Ok(serde_json::to_string_pretty(&limited)?)
}

pub fn data_understanding_prompt(rows: &[Row], context: &AnalysisContext) -> Result<String> {
    let stage = Stage::DataUnderstanding;
    Ok(format!(
        r#"{preamble}
# {label}階段

我將為您提供銷售數據，請分析這些數據並更新上下文。
請特別聚焦數據模式、趨勢和可能的異常。

## 銷售數據（前 {rows} 行展示）
{data}

## 目前上下文
{context}

## 您的任務
請在 "thinking" 部分新增以下內容：
1. 數據模式：識別數據中的主要模式和特徵
2. 異常值：識別可能的異常值或不尋常模式
3. 數據質量：評估數據的完整性和可靠性
4. 基礎統計：提供基本統計數據（如平均銷售額、最高/最低銷售記錄等）

字段名稱範例：使用 "數據模式"，而非 "data_patterns"。
{contract}"#,
        preamble = role_preamble(stage.role()),
        label = stage.label(),
        rows = rows.len().min(MAX_EXCERPT_ROWS),
        data = data_excerpt(rows)?,
        context = context.to_pretty_json()?,
        contract = OUTPUT_CONTRACT,
    ))
}

pub fn analytical_reasoning_prompt(context: &AnalysisContext) -> Result<String> {
    let stage = Stage::AnalyticalReasoning;
    Ok(format!(
        r#"{preamble}
# {label}階段

基於前面的數據理解，現在進行深入分析。

## 目前上下文
{context}

## 您的任務
請在 "thinking" 部分新增以下分析：
1. 區域分析：各區域的銷售表現，包括強勢和弱勢區域
2. 產品表現：各產品的銷售表現，包括銷售趨勢和潛力
3. 客戶洞察：不同客戶群體的購買行為
4. 相關性分析：產品、區域和客戶類型之間的相關性
5. 時間序列見解：時間序列中的趨勢和季節性模式

字段名稱範例：使用 "區域分析"，而非 "regional_analysis"。
{contract}"#,
        preamble = role_preamble(stage.role()),
        label = stage.label(),
        context = context.to_pretty_json()?,
        contract = OUTPUT_CONTRACT,
    ))
}

pub fn result_generation_prompt(context: &AnalysisContext) -> Result<String> {
    let stage = Stage::ResultGeneration;
    let report_schema = serde_json::to_string_pretty(&schemars::schema_for!(SalesReport))?;

    Ok(format!(
        r#"{preamble}
# {label}階段

根據前面的分析，現在產生最終結果和建議。

## 目前上下文
{context}

## 您的任務
請在 "results" 部分新增以下內容：
1. 重點見解：3-5 個重點見解，按重要性排序
2. 建議：3-5 個具體建議，每個建議是一個含有「建議」和「步驟」兩個鍵的物件，「步驟」為實施步驟列表
3. 策略影響：這些發現對業務策略的影響
4. 未來機會：基於數據識別的未來增長機會
5. 總結：整體分析總結（200 字以內）

結果必須基於前面的分析，並提供具體的行動建議。
"results" 必須符合以下 JSON Schema：
{schema}
{contract}"#,
        preamble = role_preamble(stage.role()),
        label = stage.label(),
        context = context.to_pretty_json()?,
        schema = report_schema,
        contract = OUTPUT_CONTRACT,
    ))
}

/// Prompt for `stage` given the current context. Raw rows only reach stage 1.
pub fn build_stage_prompt(stage: Stage, rows: &[Row], context: &AnalysisContext) -> Result<String> {
    match stage {
        Stage::DataUnderstanding => data_understanding_prompt(rows, context),
        Stage::AnalyticalReasoning => analytical_reasoning_prompt(context),
        Stage::ResultGeneration => result_generation_prompt(context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::schema::columns;
    use serde_json::json;

    fn seed() -> AnalysisContext {
        AnalysisContext::new(PipelineConfig::default().context_header())
    }

    fn wide_row(i: usize) -> Row {
        (0..15)
            .map(|c| (format!("欄{:02}", c), json!(i * 100 + c)))
            .collect()
    }

    #[test]
    fn test_excerpt_limits_rows_and_columns() {
        let rows: Vec<Row> = (0..30).map(wide_row).collect();
        let excerpt: Vec<Map<String, Value>> =
            serde_json::from_str(&data_excerpt(&rows).unwrap()).unwrap();
        assert_eq!(excerpt.len(), MAX_EXCERPT_ROWS);
        assert!(excerpt.iter().all(|r| r.len() == MAX_EXCERPT_COLUMNS));
        assert!(excerpt[0].contains_key("欄09"));
        assert!(!excerpt[0].contains_key("欄10"));
    }

    #[test]
    fn test_stage_one_includes_data_and_context() {
        let rows = vec![Row::new()
            .with(columns::PRODUCT, "獨特產品名稱")
            .with(columns::SALES_AMOUNT, 1200)];
        let ctx = seed();
        let prompt = data_understanding_prompt(&rows, &ctx).unwrap();
        assert!(prompt.contains("數據分析師"));
        assert!(prompt.contains("獨特產品名稱"));
        assert!(prompt.contains(&ctx.to_pretty_json().unwrap()));
        assert!(prompt.contains("僅返回一個 JSON 物件"));
        assert!(prompt.contains("繁體中文"));
    }

    #[test]
    fn test_later_stages_omit_raw_rows() {
        let rows = vec![Row::new().with(columns::PRODUCT, "獨特產品名稱")];
        let mut ctx = seed();
        ctx.thinking.insert("數據模式".into(), json!("季末成長"));

        for stage in [Stage::AnalyticalReasoning, Stage::ResultGeneration] {
            let prompt = build_stage_prompt(stage, &rows, &ctx).unwrap();
            assert!(!prompt.contains("獨特產品名稱"));
            assert!(prompt.contains("季末成長"));
            assert!(prompt.contains(stage.role()));
            assert!(prompt.contains("僅返回一個 JSON 物件"));
        }
    }

    #[test]
    fn test_result_prompt_embeds_report_schema() {
        let prompt = result_generation_prompt(&seed()).unwrap();
        assert!(prompt.contains("\"未來機會\""));
        assert!(prompt.contains("\"步驟\""));
    }

    #[test]
    fn test_prompts_are_pure() {
        let rows: Vec<Row> = (0..3).map(wide_row).collect();
        let ctx = seed();
        assert_eq!(
            build_stage_prompt(Stage::DataUnderstanding, &rows, &ctx).unwrap(),
            build_stage_prompt(Stage::DataUnderstanding, &rows, &ctx).unwrap()
        );
    }
}
