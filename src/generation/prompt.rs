// src/generation/prompt.rs

use serde::{Deserialize, Serialize};

use crate::generation::GenerationRequest;
use crate::models::question::QuestionType;

const SYSTEM_PROMPT: &str = "You are a quiz generator for teachers. \
Return only valid JSON. No markdown fences. \
Output format: {\"questions\":[...]}";

const DEFAULT_SYLLABUS_SCOPE: &str = "General conceptual coverage";

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 1400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputLanguage {
    #[default]
    English,
    Tamil,
}

impl OutputLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputLanguage::English => "English",
            OutputLanguage::Tamil => "Tamil",
        }
    }
}

/// OpenAI-compatible chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

fn type_instructions(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::Mcq => {
            "Generate only MCQ questions. \
             Each question must have exactly 4 options and one valid correct_option_index (0-3)."
        }
        QuestionType::TrueFalse => {
            "Generate only true/false questions. \
             Set correct_answer strictly as \"True\" or \"False\"."
        }
        QuestionType::ShortAnswer => {
            "Generate only short answer questions. \
             Provide a short, clear correct_answer."
        }
    }
}

fn user_prompt(req: &GenerationRequest) -> String {
    let scope = req
        .syllabus_scope
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SYLLABUS_SCOPE);

    format!(
        "Topic: {topic}\n\
         Question type: {qtype}\n\
         Number of questions: {count}\n\
         Marks per question: {marks}\n\
         Difficulty: {difficulty}\n\
         Output language: {language}\n\
         Syllabus focus: {scope}\n\
         {instructions}\n\
         Each question object must include: \"question_text\", \"marks\", and fields based on type: \
         MCQ -> \"options\" (4 strings), \"correct_option_index\"; \
         True/False -> \"correct_answer\"; \
         Short Answer -> \"correct_answer\".",
        topic = req.topic.trim(),
        qtype = req.question_type,
        count = req.count,
        marks = req.marks,
        difficulty = req.difficulty.as_str(),
        language = req.output_language.as_str(),
        scope = scope,
        instructions = type_instructions(req.question_type),
    )
}

/// Builds the chat request for one generation call. Pure.
pub fn build_chat_request(model: &str, req: &GenerationRequest) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_prompt(req),
            },
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
        stream: false,
        response_format: ResponseFormat {
            kind: "json_object",
        },
    }
}
