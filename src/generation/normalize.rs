// src/generation/normalize.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generation::GenerationError;
use crate::models::question::{
    DraftError, McqDraft, QuestionDraft, QuestionType, ShortAnswerDraft, TrueFalseDraft,
    TruthValue,
};

/// Validated questions from one completion, ready for ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedBatch {
    pub questions: Vec<QuestionDraft>,
    /// Items dropped by the per-item checks.
    pub discarded: usize,
}

impl NormalizedBatch {
    pub fn valid_count(&self) -> usize {
        self.questions.len()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// One generated item before validation. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    question_text: Value,
    #[serde(default)]
    marks: Value,
    #[serde(default)]
    options: Value,
    #[serde(default)]
    correct_option_index: Value,
    #[serde(default)]
    correct_answer: Value,
}

/// Why a single generated item was dropped.
#[derive(Debug)]
enum Discard {
    NotAnObject,
    OptionsNotAList,
    IndexNotNumeric,
    NegativeIndex(i64),
    InvalidTruthValue,
    Draft(DraftError),
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::NotAnObject => write!(f, "item is not an object"),
            Discard::OptionsNotAList => write!(f, "options is not a list"),
            Discard::IndexNotNumeric => write!(f, "correct_option_index is not an integer"),
            Discard::NegativeIndex(i) => write!(f, "correct_option_index {} is negative", i),
            Discard::InvalidTruthValue => write!(f, "correct_answer is not \"True\" or \"False\""),
            Discard::Draft(e) => write!(f, "{}", e),
        }
    }
}

impl From<DraftError> for Discard {
    fn from(err: DraftError) -> Self {
        Discard::Draft(err)
    }
}

/// Pulls the `questions` list out of a completion response.
///
/// Fails when the envelope, the embedded JSON document, or the list itself is missing.
pub fn extract_items(raw: &Value) -> Result<Vec<Value>, GenerationError> {
    let response: CompletionResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        GenerationError::MalformedResponse(format!("unexpected response envelope: {}", e))
    })?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response has no message content".to_string())
        })?;

    let document: Value = serde_json::from_str(content.trim()).map_err(|e| {
        GenerationError::MalformedResponse(format!("message content is not JSON: {}", e))
    })?;

    match document.get("questions") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(GenerationError::MalformedResponse(
            "\"questions\" is not a list".to_string(),
        )),
        None => Err(GenerationError::MalformedResponse(
            "response has no \"questions\" list".to_string(),
        )),
    }
}

/// Validates each item as `question_type`, dropping the ones that fail.
pub fn normalize_items(
    items: Vec<Value>,
    question_type: QuestionType,
    default_marks: i64,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, item) in items.into_iter().enumerate() {
        match decode_item(item, question_type, default_marks) {
            Ok(draft) => batch.questions.push(draft),
            Err(reason) => {
                tracing::warn!(index, %reason, "Discarding generated {} question", question_type);
                batch.discarded += 1;
            }
        }
    }

    batch
}

/// Extract + normalize in one step.
pub fn normalize_response(
    raw: &Value,
    question_type: QuestionType,
    default_marks: i64,
) -> Result<NormalizedBatch, GenerationError> {
    let items = extract_items(raw)?;
    Ok(normalize_items(items, question_type, default_marks))
}

fn decode_item(
    item: Value,
    question_type: QuestionType,
    default_marks: i64,
) -> Result<QuestionDraft, Discard> {
    if !item.is_object() {
        return Err(Discard::NotAnObject);
    }
    let raw: RawItem = serde_json::from_value(item).map_err(|_| Discard::NotAnObject)?;

    let question_text = scalar_text(&raw.question_text);
    let marks = coerce_marks(&raw.marks).unwrap_or(default_marks).max(1);

    let draft = match question_type {
        QuestionType::Mcq => {
            let Value::Array(entries) = &raw.options else {
                return Err(Discard::OptionsNotAList);
            };
            let options: Vec<String> = entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| {
                    let text = scalar_text(entry);
                    if text.is_empty() {
                        format!("Option {}", idx + 1)
                    } else {
                        text
                    }
                })
                .collect();

            let index = coerce_int(&raw.correct_option_index).ok_or(Discard::IndexNotNumeric)?;
            let correct_option_index =
                usize::try_from(index).map_err(|_| Discard::NegativeIndex(index))?;

            QuestionDraft::Mcq(McqDraft {
                question_text,
                marks,
                options,
                correct_option_index,
            })
        }
        QuestionType::TrueFalse => {
            let correct_answer = TruthValue::parse(&scalar_text(&raw.correct_answer))
                .ok_or(Discard::InvalidTruthValue)?;
            QuestionDraft::TrueFalse(TrueFalseDraft {
                question_text,
                marks,
                correct_answer,
            })
        }
        QuestionType::ShortAnswer => QuestionDraft::ShortAnswer(ShortAnswerDraft {
            question_text,
            marks,
            correct_answer: scalar_text(&raw.correct_answer),
        }),
    };

    draft.check()?;
    Ok(draft)
}

/// Renders a scalar as trimmed text. Lists, objects and null render empty.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Integers, integral floats and numeric strings. Anything else is `None`.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Like [`coerce_int`], but fractional numbers are truncated instead of rejected.
fn coerce_marks(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        _ => coerce_int(value),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn completion(document: Value) -> Value {
        json!({
            "id": "gen-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": document.to_string() }
            }]
        })
    }

    #[test]
    fn valid_mcq_keeps_exactly_one_correct_option() {
        let raw = completion(json!({
            "questions": [{
                "question_text": "Which gas do plants absorb?",
                "options": ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
                "correct_option_index": 1,
                "marks": 2
            }]
        }));

        let batch = normalize_response(&raw, QuestionType::Mcq, 1).unwrap();
        assert_eq!(batch.valid_count(), 1);
        assert_eq!(batch.discarded, 0);

        let QuestionDraft::Mcq(mcq) = &batch.questions[0] else {
            panic!("expected mcq draft");
        };
        assert_eq!(mcq.options.len(), 4);
        assert_eq!(mcq.correct_option_index, 1);
        assert_eq!(mcq.marks, 2);
    }

    #[test]
    fn bad_mcq_indices_are_discarded_individually() {
        let items = vec![
            json!({"question_text": "Q1", "options": ["a", "b", "c", "d"], "correct_option_index": 3}),
            json!({"question_text": "Q2", "options": ["a", "b", "c", "d"], "correct_option_index": 4}),
            json!({"question_text": "Q3", "options": ["a", "b", "c", "d"], "correct_option_index": "B"}),
            json!({"question_text": "Q4", "options": ["a", "b", "c", "d"], "correct_option_index": -1}),
            json!({"question_text": "Q5", "options": ["a"], "correct_option_index": 0}),
            json!({"question_text": "Q6", "options": ["a", "b"], "correct_option_index": "0"}),
            json!({"question_text": "Q7", "options": "a,b,c", "correct_option_index": 0}),
        ];

        let batch = normalize_items(items, QuestionType::Mcq, 1);
        let texts: Vec<&str> = batch.questions.iter().map(|q| q.question_text()).collect();
        assert_eq!(texts, vec!["Q1", "Q6"]);
        assert_eq!(batch.discarded, 5);
    }

    #[test]
    fn blank_options_get_placeholder_text() {
        let items = vec![json!({
            "question_text": "Pick one",
            "options": ["Red", "  ", null, "Blue"],
            "correct_option_index": 0
        })];
        let batch = normalize_items(items, QuestionType::Mcq, 1);
        let QuestionDraft::Mcq(mcq) = &batch.questions[0] else {
            panic!("expected mcq draft");
        };
        assert_eq!(mcq.options, vec!["Red", "Option 2", "Option 3", "Blue"]);
    }

    #[test]
    fn true_false_answers_must_be_exact_literals() {
        let items = vec![
            json!({"question_text": "A", "correct_answer": " True "}),
            json!({"question_text": "B", "correct_answer": "False"}),
            json!({"question_text": "C", "correct_answer": "true"}),
            json!({"question_text": "D", "correct_answer": "Yes"}),
            json!({"question_text": "E"}),
            json!({"question_text": "F", "correct_answer": false}),
        ];
        let batch = normalize_items(items, QuestionType::TrueFalse, 1);
        let texts: Vec<&str> = batch.questions.iter().map(|q| q.question_text()).collect();
        assert_eq!(texts, vec!["A", "B", "F"]);
        assert_eq!(batch.discarded, 3);
    }

    #[test]
    fn short_answers_need_a_reference_answer() {
        let items = vec![
            json!({"question_text": "Define mitosis", "correct_answer": "Cell division"}),
            json!({"question_text": "Define meiosis", "correct_answer": "   "}),
            json!({"question_text": "   ", "correct_answer": "orphan"}),
        ];
        let batch = normalize_items(items, QuestionType::ShortAnswer, 1);
        assert_eq!(batch.valid_count(), 1);
        assert_eq!(batch.discarded, 2);
    }

    #[test]
    fn marks_fall_back_to_default_with_floor_of_one() {
        let items = vec![
            json!({"question_text": "a", "correct_answer": "x", "marks": "4"}),
            json!({"question_text": "b", "correct_answer": "x", "marks": "lots"}),
            json!({"question_text": "c", "correct_answer": "x"}),
            json!({"question_text": "d", "correct_answer": "x", "marks": 0}),
            json!({"question_text": "e", "correct_answer": "x", "marks": 2.0}),
            json!({"question_text": "f", "correct_answer": "x", "marks": 2.5}),
            json!({"question_text": "g", "correct_answer": "x", "marks": 0.4}),
        ];
        let batch = normalize_items(items, QuestionType::ShortAnswer, 3);
        let marks: Vec<i64> = batch.questions.iter().map(|q| q.marks()).collect();
        assert_eq!(marks, vec![4, 3, 3, 1, 2, 2, 1]);
    }

    #[test]
    fn non_object_items_are_discarded() {
        let items = vec![json!("just text"), json!(7), json!(null)];
        let batch = normalize_items(items, QuestionType::ShortAnswer, 1);
        assert_eq!(batch.valid_count(), 0);
        assert_eq!(batch.discarded, 3);
    }

    #[test]
    fn empty_question_list_is_not_an_error() {
        let raw = completion(json!({ "questions": [] }));
        let batch = normalize_response(&raw, QuestionType::Mcq, 1).unwrap();
        assert_eq!(batch.valid_count(), 0);
        assert_eq!(batch.discarded, 0);
    }

    #[test]
    fn unparsable_content_fails_the_whole_step() {
        let raw = json!({
            "choices": [{ "message": { "content": "Sure! Here are your questions: ..." } }]
        });
        assert!(matches!(
            normalize_response(&raw, QuestionType::Mcq, 1),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_envelope_or_list_is_malformed() {
        assert!(matches!(
            extract_items(&json!({ "choices": [] })),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_items(&completion(json!({ "items": [] }))),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_items(&completion(json!({ "questions": {"q": 1} }))),
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}
