//! Candidate profile, questions, responses and the session aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::InterviewStage;
use crate::error::SessionError;

/// Education record from the profile form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub year: String,
}

/// A project the candidate worked on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub description: String,
}

/// A completed course or certification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub course_name: String,
    pub platform: String,
}

/// Candidate-supplied facts. Immutable once a session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub full_name: String,
    pub profession: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub education: Education,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

impl UserProfile {
    /// Trim and deduplicate the form input, dropping incomplete entries.
    ///
    /// Fails if the full name or profession is blank.
    pub fn normalized(self) -> Result<Self, SessionError> {
        let full_name = self.full_name.trim().to_string();
        let profession = self.profession.trim().to_string();
        if full_name.is_empty() {
            return Err(SessionError::InvalidProfile {
                reason: "full name is required".to_string(),
            });
        }
        if profession.is_empty() {
            return Err(SessionError::InvalidProfile {
                reason: "profession is required".to_string(),
            });
        }

        let projects = self
            .projects
            .into_iter()
            .filter(|p| !p.name.trim().is_empty() && !p.description.trim().is_empty())
            .map(|p| Project {
                name: p.name.trim().to_string(),
                technologies: dedup_trimmed(p.technologies),
                description: p.description.trim().to_string(),
            })
            .collect();

        let certificates = self
            .certificates
            .into_iter()
            .filter(|c| !c.course_name.trim().is_empty() && !c.platform.trim().is_empty())
            .map(|c| Certificate {
                course_name: c.course_name.trim().to_string(),
                platform: c.platform.trim().to_string(),
            })
            .collect();

        Ok(Self {
            full_name,
            profession,
            skills: dedup_trimmed(self.skills),
            education: Education {
                degree: self.education.degree.trim().to_string(),
                institution: self.education.institution.trim().to_string(),
                year: self.education.year.trim().to_string(),
            },
            projects,
            certificates,
        })
    }
}

/// Trim entries, drop empties and later duplicates, keep first-seen order.
fn dedup_trimmed(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|s| s == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Code,
}

/// A single interview question produced by a question source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewQuestion {
    pub id: String,
    pub stage: InterviewStage,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Suggested answer time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_secs: Option<u32>,
    /// Informational only; answers are never checked against these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl InterviewQuestion {
    pub fn text(id: impl Into<String>, stage: InterviewStage, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage,
            prompt: prompt.into(),
            kind: QuestionType::Text,
            expected_duration_secs: None,
            keywords: Vec::new(),
        }
    }

    pub fn code(id: impl Into<String>, stage: InterviewStage, prompt: impl Into<String>) -> Self {
        Self {
            kind: QuestionType::Code,
            ..Self::text(id, stage, prompt)
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.expected_duration_secs = Some(secs);
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn is_code(&self) -> bool {
        self.kind == QuestionType::Code
    }

    /// Expected duration as `m:ss`, e.g. "2:30".
    pub fn expected_duration_label(&self) -> Option<String> {
        self.expected_duration_secs
            .map(|secs| format!("{}:{:02}", secs / 60, secs % 60))
    }
}

/// Languages offered by the code editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLanguage {
    Javascript,
    Python,
    Java,
    Cpp,
    C,
}

impl Default for CodeLanguage {
    fn default() -> Self {
        Self::Javascript
    }
}

impl CodeLanguage {
    /// Starter code shown when the editor opens or the language changes.
    pub fn starter_template(&self) -> &'static str {
        match self {
            Self::Javascript => "// Write your JavaScript code here\nfunction solution() {\n    \n}",
            Self::Python => "# Write your Python code here\ndef solution():\n    pass",
            Self::Java => {
                "// Write your Java code here\npublic class Solution {\n    public void solution() {\n        \n    }\n}"
            }
            Self::Cpp => {
                "// Write your C++ code here\n#include <iostream>\nusing namespace std;\n\nint main() {\n    \n    return 0;\n}"
            }
            Self::C => "// Write your C code here\n#include <stdio.h>\n\nint main() {\n    \n    return 0;\n}",
        }
    }
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Javascript => write!(f, "javascript"),
            Self::Python => write!(f, "python"),
            Self::Java => write!(f, "java"),
            Self::Cpp => write!(f, "cpp"),
            Self::C => write!(f, "c"),
        }
    }
}

impl std::str::FromStr for CodeLanguage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Self::Javascript),
            "python" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            "cpp" => Ok(Self::Cpp),
            "c" => Ok(Self::C),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

/// Code written for a coding question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeAnswer {
    pub code: String,
    pub language: CodeLanguage,
}

/// One recorded answer. Never mutated once appended to the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewResponse {
    pub question_id: String,
    /// Stage the answered question belongs to.
    pub stage: InterviewStage,
    /// Free-text answer, or the explanation accompanying a code answer.
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeAnswer>,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the session started.
    pub duration_ms: i64,
}

/// The session aggregate owned by a `SessionController`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_profile: UserProfile,
    pub current_stage: InterviewStage,
    pub current_question_index: usize,
    /// Questions for `current_stage` only; replaced on every stage change.
    pub questions: Vec<InterviewQuestion>,
    pub responses: Vec<InterviewResponse>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl InterviewSession {
    /// A fresh session positioned at the first stage with no questions yet.
    pub fn new(user_profile: UserProfile, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_profile,
            current_stage: InterviewStage::first(),
            current_question_index: 0,
            questions: Vec::new(),
            responses: Vec::new(),
            start_time,
            end_time: None,
        }
    }

    /// The question under the cursor, if the stage has one.
    pub fn current_question(&self) -> Option<&InterviewQuestion> {
        self.questions.get(self.current_question_index)
    }

    /// Whether the cursor sits on the final question of the stage.
    pub fn is_last_question(&self) -> bool {
        self.current_question_index + 1 >= self.questions.len()
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Whether a response for `question_id` was already recorded.
    pub fn has_response_for(&self, question_id: &str) -> bool {
        self.responses.iter().any(|r| r.question_id == question_id)
    }

    /// Build a response stamped relative to the session start.
    pub fn response_at(
        &self,
        question: &InterviewQuestion,
        response: String,
        code: Option<CodeAnswer>,
        now: DateTime<Utc>,
    ) -> InterviewResponse {
        InterviewResponse {
            question_id: question.id.clone(),
            stage: question.stage,
            response,
            code,
            timestamp: now,
            duration_ms: (now - self.start_time).num_milliseconds(),
        }
    }
}
