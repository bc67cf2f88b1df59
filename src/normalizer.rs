//! Normalizes document API payloads into [`SearchPage`]s.
//!
//! Two response families exist upstream:
//! - `body.resultList`: records of `{meta, data}`. Each becomes a
//!   [`DocumentItem`] with cleaned text, a preview, and the metadata fields
//!   listed for its document type.
//! - `body.items`: a list, `{item: [...]}` or `{item: {...}}`. Items are
//!   flattened into a list and passed through without cleaning or field
//!   extraction.
//!
//! The asymmetry between the two is intentional and kept as-is.

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::config::{doc_type_config, MetaField};
use crate::error::SearchError;
use crate::html::{clean_html_content, preview_content};
use crate::schema::{DocType, DocumentItem, SearchItem, SearchPage};

pub const SUCCESS_CODE: &str = "00";

/// Page values the caller asked for; used when the body omits them.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

/// Turn a decoded response body into a page or an error. Never panics on
/// unexpected shapes.
pub fn parse_api_response(
    data: &Value,
    doc_type: DocType,
    request: PageRequest,
    preview_max_length: usize,
) -> Result<SearchPage, SearchError> {
    let result = parse_envelope(data, doc_type, request, preview_max_length);
    match &result {
        Ok(page) => info!(
            "API response processed: {} items, {} total",
            page.items.len(),
            page.total_count
        ),
        Err(e) => error!("API response rejected: {}", e),
    }
    result
}

fn parse_envelope(
    data: &Value,
    doc_type: DocType,
    request: PageRequest,
    preview_max_length: usize,
) -> Result<SearchPage, SearchError> {
    let root = data
        .as_object()
        .ok_or_else(|| SearchError::Parse(format!("expected object, got {}", kind(data))))?;

    let mut page = SearchPage {
        items: Vec::new(),
        total_count: 0,
        page_no: u64::from(request.page),
        num_of_rows: u64::from(request.per_page),
        doc_type,
    };

    let Some(response) = root.get("response") else {
        return Ok(page);
    };
    let response = response
        .as_object()
        .ok_or_else(|| SearchError::Parse("`response` is not an object".to_string()))?;

    if let Some(header) = response.get("header") {
        check_header(header)?;
    }

    let Some(body) = response.get("body") else {
        return Ok(page);
    };
    let body = body
        .as_object()
        .ok_or_else(|| SearchError::Parse("`body` is not an object".to_string()))?;

    page.total_count = number_field(body, "totalCount")?.unwrap_or(0);
    page.page_no = number_field(body, "pageNo")?.unwrap_or(page.page_no);
    page.num_of_rows = number_field(body, "numOfRows")?.unwrap_or(page.num_of_rows);

    if let Some(records) = body.get("resultList") {
        page.items = process_result_list(records, doc_type, preview_max_length)?
            .into_iter()
            .map(SearchItem::Document)
            .collect();
    } else if let Some(items) = body.get("items") {
        page.items = process_items(items).into_iter().map(SearchItem::Raw).collect();
    }

    Ok(page)
}

/// Reject any header whose `resultCode` is present and not the success code.
fn check_header(header: &Value) -> Result<(), SearchError> {
    let Some(code) = header.get("resultCode") else {
        return Ok(());
    };
    let code = scalar_to_string(code);
    if code == SUCCESS_CODE {
        info!("API response OK: code={}", code);
        return Ok(());
    }
    let message = header
        .get("resultMsg")
        .map(scalar_to_string)
        .unwrap_or_default();
    Err(SearchError::Upstream { code, message })
}

/// Build canonical items from `resultList`. A single record is accepted in
/// place of a list; a null or empty value yields no items.
fn process_result_list(
    records: &Value,
    doc_type: DocType,
    preview_max_length: usize,
) -> Result<Vec<DocumentItem>, SearchError> {
    let records: Vec<&Value> = match records {
        Value::Array(list) => list.iter().collect(),
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other],
    };

    let fields = doc_type_config(doc_type).meta_fields;
    let empty = Map::new();

    records
        .into_iter()
        .map(|record| {
            let record = record
                .as_object()
                .ok_or_else(|| SearchError::Parse(format!("record is {}", kind(record))))?;
            let meta = object_field(record, "meta")?.unwrap_or(&empty);
            let data = object_field(record, "data")?.unwrap_or(&empty);

            let content = clean_html_content(&text(data, "text"));
            let mut item = DocumentItem {
                id: text(meta, "doc_id"),
                title: text(meta, "title"),
                doc_type: text(meta, "doc_type"),
                date: text(meta, "date"),
                description: preview_content(&content, preview_max_length),
                content,
                ..Default::default()
            };
            for field in fields {
                set_meta_field(&mut item, *field, text(meta, field.key()));
            }
            Ok(item)
        })
        .collect()
}

fn set_meta_field(item: &mut DocumentItem, field: MetaField, value: String) {
    let slot = match field {
        MetaField::Time => &mut item.time,
        MetaField::Ministry => &mut item.ministry,
        MetaField::Department => &mut item.department,
        MetaField::Manager => &mut item.manager,
        MetaField::RelevantDepartments => &mut item.relevantdepartments,
        MetaField::Place => &mut item.place,
        MetaField::Person => &mut item.person,
    };
    *slot = Some(value);
}

/// Flatten the three `items` shapes into one list.
fn process_items(items: &Value) -> Vec<Value> {
    match items {
        Value::Array(list) => list.clone(),
        Value::Object(map) => match map.get("item") {
            Some(Value::Array(list)) => list.clone(),
            Some(single @ Value::Object(_)) => vec![single.clone()],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// ============================================================================
// Value helpers
// ============================================================================

fn object_field<'a>(
    map: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, SearchError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(other) => Err(SearchError::Parse(format!(
            "`{}` is {}, expected object",
            key,
            kind(other)
        ))),
    }
}

/// String view of a metadata value; missing and null become "".
fn text(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).map(scalar_to_string).unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Counters arrive as numbers or numeric strings depending on the endpoint.
fn number_field(map: &Map<String, Value>, key: &str) -> Result<Option<u64>, SearchError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| SearchError::Parse(format!("`{}` is not a count: {}", key, n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SearchError::Parse(format!("`{}` is not a count: {:?}", key, s))),
        Some(other) => Err(SearchError::Parse(format!(
            "`{}` is {}, expected number",
            key,
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REQ: PageRequest = PageRequest { page: 3, per_page: 15 };

    fn envelope(body: Value) -> Value {
        json!({
            "response": {
                "header": {"resultCode": "00", "resultMsg": "NORMAL SERVICE."},
                "body": body
            }
        })
    }

    fn press_record(id: &str) -> Value {
        json!({
            "meta": {
                "doc_id": id,
                "title": format!("보도자료 {}", id),
                "doc_type": "보도자료",
                "date": "2024-03-01",
                "time": "09:00",
                "ministry": "행정안전부",
                "department": "디지털정부국",
                "manager": "홍길동",
                "relevantdepartments": "공공데이터정책과"
            },
            "data": {"text": "<p>□정책 개요</p><img src=\"x.png\"><p>○ 세부 내용</p>"}
        })
    }

    #[test]
    fn test_result_list_press_items() {
        let data = envelope(json!({
            "totalCount": 2, "pageNo": 1, "numOfRows": 10,
            "resultList": [press_record("P1"), press_record("P2")]
        }));

        let page = parse_api_response(&data, DocType::Press, REQ, 500).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 2);
        assert_eq!(page.page_no, 1);
        assert_eq!(page.num_of_rows, 10);

        for item in &page.items {
            let SearchItem::Document(doc) = item else {
                panic!("expected document item");
            };
            assert!(!doc.id.is_empty());
            assert!(!doc.title.is_empty());
            assert_eq!(doc.content, "□ 정책 개요\n\n○ 세부 내용");
            assert_eq!(doc.description, doc.content);
            assert_eq!(doc.ministry.as_deref(), Some("행정안전부"));
            assert_eq!(doc.department.as_deref(), Some("디지털정부국"));
            assert_eq!(doc.manager.as_deref(), Some("홍길동"));
            assert_eq!(doc.relevantdepartments.as_deref(), Some("공공데이터정책과"));
            assert_eq!(doc.time.as_deref(), Some("09:00"));
            assert!(doc.place.is_none());
            assert!(doc.person.is_none());
        }
    }

    #[test]
    fn test_field_set_follows_doc_type() {
        let record = json!({
            "meta": {"doc_id": "S1", "title": "연설", "place": "세종", "person": "장관", "ministry": "X"},
            "data": {"text": "본문"}
        });
        let data = envelope(json!({"totalCount": 1, "resultList": [record.clone()]}));

        let speech = parse_api_response(&data, DocType::Speech, REQ, 500).unwrap();
        let SearchItem::Document(doc) = &speech.items[0] else { panic!() };
        assert_eq!(doc.place.as_deref(), Some("세종"));
        assert_eq!(doc.person.as_deref(), Some("장관"));
        assert!(doc.ministry.is_none());

        let publication = parse_api_response(&data, DocType::Publication, REQ, 500).unwrap();
        let SearchItem::Document(doc) = &publication.items[0] else { panic!() };
        assert_eq!(doc.person.as_deref(), Some("장관"));
        assert!(doc.place.is_none());

        let report = parse_api_response(&data, DocType::Report, REQ, 500).unwrap();
        let SearchItem::Document(doc) = &report.items[0] else { panic!() };
        assert_eq!(doc.ministry.as_deref(), Some("X"));
        assert_eq!(doc.manager.as_deref(), Some(""));
        assert!(doc.time.is_none());

        let all = parse_api_response(&data, DocType::All, REQ, 500).unwrap();
        let SearchItem::Document(doc) = &all.items[0] else { panic!() };
        assert!(doc.ministry.is_none() && doc.person.is_none() && doc.place.is_none());
    }

    #[test]
    fn test_single_record_result_list() {
        let data = envelope(json!({"totalCount": 1, "resultList": press_record("ONE")}));
        let page = parse_api_response(&data, DocType::Press, REQ, 500).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id(), Some("ONE"));
    }

    #[test]
    fn test_description_is_truncated_preview() {
        let record = json!({
            "meta": {"doc_id": "L"},
            "data": {"text": "<p>□ 첫째 항목</p><p>□ 둘째 항목</p>"}
        });
        let data = envelope(json!({"resultList": [record]}));
        let page = parse_api_response(&data, DocType::All, REQ, 8).unwrap();
        let SearchItem::Document(doc) = &page.items[0] else { panic!() };
        assert_eq!(doc.content, "□ 첫째 항목\n\n□ 둘째 항목");
        assert_eq!(doc.description, "□ 첫째 항목...");
    }

    #[test]
    fn test_error_code_short_circuits_body() {
        // body is malformed on purpose: it must never be read
        let data = json!({
            "response": {
                "header": {"resultCode": "30", "resultMsg": "SERVICE KEY IS NOT REGISTERED ERROR."},
                "body": "not an object"
            }
        });
        let err = parse_api_response(&data, DocType::Press, REQ, 500).unwrap_err();
        assert_eq!(
            err,
            SearchError::Upstream {
                code: "30".into(),
                message: "SERVICE KEY IS NOT REGISTERED ERROR.".into()
            }
        );
    }

    #[test]
    fn test_items_list_passthrough() {
        let data = envelope(json!({
            "totalCount": 2,
            "items": [{"id": "a", "title": "<b>raw</b>"}, {"id": "b"}]
        }));
        let page = parse_api_response(&data, DocType::Speech, REQ, 500).unwrap();
        assert_eq!(page.items.len(), 2);
        // No cleaning on the items path
        assert_eq!(page.items[0], SearchItem::Raw(json!({"id": "a", "title": "<b>raw</b>"})));
    }

    #[test]
    fn test_items_dict_with_list_and_single() {
        let list = envelope(json!({"items": {"item": [{"id": 1}, {"id": 2}, {"id": 3}]}}));
        assert_eq!(
            parse_api_response(&list, DocType::Plan, REQ, 500).unwrap().items.len(),
            3
        );

        let single = envelope(json!({"items": {"item": {"id": "only"}}}));
        let page = parse_api_response(&single, DocType::Plan, REQ, 500).unwrap();
        assert_eq!(page.items, vec![SearchItem::Raw(json!({"id": "only"}))]);

        let empty = envelope(json!({"items": ""}));
        assert!(parse_api_response(&empty, DocType::Plan, REQ, 500)
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn test_paging_defaults_to_request_values() {
        let data = envelope(json!({"totalCount": "42", "items": []}));
        let page = parse_api_response(&data, DocType::All, REQ, 500).unwrap();
        assert_eq!(page.total_count, 42);
        assert_eq!(page.page_no, 3);
        assert_eq!(page.num_of_rows, 15);
        assert_eq!(page.doc_type, DocType::All);
    }

    #[test]
    fn test_missing_response_is_empty_page() {
        let page = parse_api_response(&json!({}), DocType::Press, REQ, 500).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn test_unexpected_shapes_become_errors() {
        let cases = [
            json!([1, 2, 3]),
            json!({"response": "nope"}),
            envelope(json!({"resultList": [42]})),
            envelope(json!({"resultList": [{"meta": "x"}]})),
            envelope(json!({"totalCount": {"n": 1}})),
        ];
        for data in cases {
            let err = parse_api_response(&data, DocType::Press, REQ, 500).unwrap_err();
            assert!(matches!(err, SearchError::Parse(_)), "data: {}", data);
        }
    }
}
