//! Template analysis and draft generation on top of the completion client.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::CompletionError;
use crate::extract::{extract_json, Extracted};
use crate::html::remove_html_tags;
use crate::openai::{CompletionClient, Message};
use crate::schema::{now_iso8601, SearchItem, TokenCostInfo};

/// Longest document text (in characters) sent for analysis.
pub const MAX_DOCUMENT_CHARS: usize = 15_000;

pub const UNTITLED: &str = "제목 없음";

const ANALYSIS_TEMPERATURE: f32 = 0.2;
const DRAFT_TEMPERATURE: f32 = 0.7;
const DRAFT_MAX_TOKENS: u32 = 2000;

const TEMPLATE_SEPARATOR: &str = "\n\n===== 템플릿 구분선 =====\n\n";

const TEMPLATE_ANALYSIS_SYSTEM_PROMPT: &str = r#"당신은 정부 문서 템플릿 분석 전문가입니다. 주어진 템플릿마다 다음을 수행하세요.

1. 표준 항목을 찾아 구조화합니다.
2. 항목별 설명과 예시를 작성합니다.
3. 항목별 작성 팁을 덧붙입니다.
4. 핵심 키워드를 추출합니다.

항목명은 템플릿에 실제로 쓰인 명칭을 그대로 사용하고, 아래 JSON 형식으로만 응답하세요.

```json
{
  "templates": [
    {
      "id": "템플릿 ID",
      "title": "템플릿 제목",
      "structure": [
        {"name": "항목명", "description": "항목 설명", "example": "항목 예시", "writing_tip": "작성 팁"}
      ],
      "keywords": ["키워드1", "키워드2"]
    }
  ]
}
```"#;

const DRAFT_SYSTEM_PROMPT: &str = "당신은 한국 정부 문서 작성을 돕는 전문가입니다. \
사용자의 요구사항과 참고 템플릿을 바탕으로 완성도 높은 보고서를 작성하세요. \
템플릿의 구조와 형식을 따르되 내용은 요구사항에 맞게 조정하고, \
결과는 마크다운으로 작성하며 필요하면 표와 목록을 사용하세요.";

// ============================================================================
// Inputs and outputs
// ============================================================================

/// What the user wants drafted. Every field is optional free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DraftInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub audience: String,
}

impl DraftInput {
    pub fn is_empty(&self) -> bool {
        [&self.title, &self.goal, &self.requirements, &self.audience]
            .iter()
            .all(|s| s.trim().is_empty())
    }

    fn display_title(&self) -> &str {
        match self.title.trim() {
            "" => UNTITLED,
            title => title,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub title: String,
    pub content: String,
    pub timestamp: String,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct DraftService {
    completion: CompletionClient,
}

impl DraftService {
    pub fn new(completion: CompletionClient) -> Self {
        Self { completion }
    }

    /// Ask the model for the standard sections of each template.
    ///
    /// Output that cannot be read as a JSON object is reported inside the
    /// returned value; only a failed completion call is an error.
    pub async fn analyze_templates(
        &self,
        templates: &[SearchItem],
    ) -> Result<(Value, TokenCostInfo), CompletionError> {
        info!("Analyzing {} template(s)", templates.len());

        let messages = template_analysis_messages(templates);
        let model = self.completion.default_model().to_string();
        let completion = self
            .completion
            .complete(messages, &model, ANALYSIS_TEMPERATURE, None)
            .await?;

        let analysis = match extract_json(&completion.content) {
            Extracted::Parsed(Value::Object(map)) if !map.is_empty() => Value::Object(map),
            _ => {
                warn!("Template analysis output was empty or not a JSON object");
                json!({
                    "templates": [],
                    "error": "could not parse analysis result",
                    "raw_response": completion.content,
                })
            }
        };

        info!("Template analysis finished for {} template(s)", templates.len());
        Ok((analysis, completion.token_info))
    }

    /// Write a report draft from the user's request and reference templates.
    pub async fn generate_draft(
        &self,
        input: &DraftInput,
        templates: &[SearchItem],
    ) -> Result<(Draft, TokenCostInfo), CompletionError> {
        info!("Generating draft from {} template(s)", templates.len());
        let started = Instant::now();

        let messages = draft_messages(input, templates);
        let model = self.completion.default_model().to_string();
        let completion = self
            .completion
            .complete(messages, &model, DRAFT_TEMPERATURE, Some(DRAFT_MAX_TOKENS))
            .await?;

        info!(
            "Draft generated in {:.2}s using {} tokens",
            started.elapsed().as_secs_f64(),
            completion.token_info.total_tokens
        );

        let draft = Draft {
            title: input.display_title().to_string(),
            content: completion.content,
            timestamp: now_iso8601(),
        };
        Ok((draft, completion.token_info))
    }

    /// Structure, tone, keywords and summary for one document.
    ///
    /// Never fails: when the call fails or its output is unusable, a
    /// heuristic structure derived from the raw markup is returned instead.
    pub async fn analyze_document(&self, text: &str) -> Value {
        let prompt = document_analysis_prompt(text);
        let model = self.completion.default_model().to_string();

        let completion = match self
            .completion
            .complete(vec![Message::user(prompt)], &model, ANALYSIS_TEMPERATURE, None)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                error!("Document analysis failed: {}", e);
                let mut fallback = heuristic_analysis(text);
                fallback.insert("error".into(), Value::String(e.to_string()));
                return Value::Object(fallback);
            }
        };

        let token_info = serde_json::to_value(&completion.token_info).unwrap_or(Value::Null);
        match extract_json(&completion.content) {
            Extracted::Parsed(Value::Object(mut analysis)) => {
                analysis.insert("token_info".into(), token_info);
                Value::Object(analysis)
            }
            _ => {
                warn!("Document analysis output is not a JSON object, using heuristics");
                let mut fallback = heuristic_analysis(text);
                fallback.insert("token_info".into(), token_info);
                fallback.insert("raw_response".into(), Value::String(completion.content));
                Value::Object(fallback)
            }
        }
    }
}

// ============================================================================
// Prompts
// ============================================================================

pub fn template_analysis_messages(templates: &[SearchItem]) -> Vec<Message> {
    let templates_text = templates
        .iter()
        .map(|item| {
            format!(
                "템플릿 ID: {}\n제목: {}\n내용:\n{}",
                item.id().unwrap_or_default(),
                item.title(),
                item.content()
            )
        })
        .collect::<Vec<_>>()
        .join(TEMPLATE_SEPARATOR);

    let user = format!(
        "다음 문서 템플릿을 분석하세요.\n\n{}\n\n\
         각 템플릿의 표준 항목과 항목별 설명, 예시, 작성 팁을 지정된 JSON 형식으로 응답하세요.",
        templates_text
    );

    vec![Message::system(TEMPLATE_ANALYSIS_SYSTEM_PROMPT), Message::user(user)]
}

pub fn draft_messages(input: &DraftInput, templates: &[SearchItem]) -> Vec<Message> {
    let requirements: Vec<String> = [
        ("제목", input.display_title()),
        ("목표", input.goal.trim()),
        ("요구사항", input.requirements.trim()),
        ("대상 독자", input.audience.trim()),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{}: {}", label, value))
    .collect();

    let references: Vec<String> = templates
        .iter()
        .filter(|item| !item.content().is_empty())
        .map(|item| {
            let title = match item.title() {
                "" => UNTITLED,
                title => title,
            };
            format!("### {}\n{}", title, item.content())
        })
        .collect();

    let user = format!(
        "## 사용자 요구사항\n{}\n\n## 참고 템플릿\n{}\n\n\
         위 요구사항과 참고 템플릿을 바탕으로 보고서를 작성하세요.",
        requirements.join("\n"),
        references.join("\n\n")
    );

    vec![Message::system(DRAFT_SYSTEM_PROMPT), Message::user(user)]
}

pub fn document_analysis_prompt(text: &str) -> String {
    let clean = truncate_chars(&remove_html_tags(text), MAX_DOCUMENT_CHARS);

    format!(
        r#"다음 문서를 분석해 JSON으로만 응답하세요.

- structure: paragraph_count, sentence_count, avg_sentence_length(단어 수), has_table, has_list, has_image
- tone: formality(0~1), sentiment(-1~1), objectivity(0~1)
- keywords: 중요도 순 핵심 키워드 10개
- summary: 200자 이내 요약

{{
  "structure": {{"paragraph_count": 0, "sentence_count": 0, "avg_sentence_length": 0, "has_table": false, "has_list": false, "has_image": false}},
  "tone": {{"formality": 0.0, "sentiment": 0.0, "objectivity": 0.0}},
  "keywords": [],
  "summary": ""
}}

문서:
```
{}
```"#,
        clean
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Structure flags read straight off the markup, with neutral tone.
pub fn heuristic_analysis(text: &str) -> Map<String, Value> {
    let lower = text.to_lowercase();
    let has_list = ["<ul", "<ol", "<li"].iter().any(|tag| lower.contains(tag));

    let analysis = json!({
        "structure": {
            "paragraph_count": 0,
            "sentence_count": 0,
            "avg_sentence_length": 0,
            "has_table": lower.contains("<table"),
            "has_list": has_list,
            "has_image": lower.contains("<img"),
        },
        "tone": {"formality": 0.5, "sentiment": 0, "objectivity": 0.5},
        "keywords": [],
        "summary": "analysis failed",
    });

    match analysis {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
