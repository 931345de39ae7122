//! Question sources: the seam between the controller and question generation.

use async_trait::async_trait;
use chrono::Utc;

use super::model::{InterviewQuestion, UserProfile};
use super::stage::InterviewStage;
use crate::error::QuestionSourceError;

/// Supplies the ordered question list for a profile and stage.
///
/// Implementations return a stage-homogeneous list. An empty list means
/// "nothing to ask" and stalls the stage.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn questions(
        &self,
        profile: &UserProfile,
        stage: InterviewStage,
    ) -> Result<Vec<InterviewQuestion>, QuestionSourceError>;
}

/// Fixed question bank, lightly personalized with profile facts.
#[derive(Debug, Clone, Default)]
pub struct TemplateQuestionSource;

impl TemplateQuestionSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuestionSource for TemplateQuestionSource {
    async fn questions(
        &self,
        profile: &UserProfile,
        stage: InterviewStage,
    ) -> Result<Vec<InterviewQuestion>, QuestionSourceError> {
        Ok(template_questions(profile, stage))
    }
}

/// Id prefix per stage, e.g. `tech_2_<batch>`.
fn id_prefix(stage: InterviewStage) -> &'static str {
    match stage {
        InterviewStage::Introductory => "intro",
        InterviewStage::Reasoning => "reason",
        InterviewStage::NonReasoning => "nonreason",
        InterviewStage::Technical => "tech",
        InterviewStage::Behavioral => "behav",
    }
}

/// Build the template question list for a stage.
pub fn template_questions(profile: &UserProfile, stage: InterviewStage) -> Vec<InterviewQuestion> {
    let batch = Utc::now().timestamp_millis();
    let prefix = id_prefix(stage);
    let id = |n: usize| format!("{prefix}_{n}_{batch}");

    match stage {
        InterviewStage::Introductory => {
            let top_skills = profile
                .skills
                .iter()
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let skills_question = if top_skills.is_empty() {
                "Which technologies or tools do you enjoy working with most and why?".to_string()
            } else {
                format!(
                    "I see you have experience with {top_skills}. Which of these do you enjoy \
                     working with most and why?"
                )
            };
            vec![
                InterviewQuestion::text(
                    id(1),
                    stage,
                    format!(
                        "Hello {}! Please tell me about yourself and what interests you about \
                         the {} role.",
                        profile.full_name, profile.profession
                    ),
                )
                .with_duration(120),
                InterviewQuestion::text(
                    id(2),
                    stage,
                    "What motivated you to pursue a career in this field, and where do you see \
                     yourself in the next 5 years?",
                )
                .with_duration(90),
                InterviewQuestion::text(id(3), stage, skills_question).with_duration(60),
            ]
        }
        InterviewStage::Reasoning => vec![
            InterviewQuestion::text(
                id(1),
                stage,
                "You have 8 balls, and one of them is slightly heavier than the others. Using a \
                 balance scale only twice, how would you identify the heavier ball?",
            )
            .with_duration(180),
            InterviewQuestion::text(
                id(2),
                stage,
                "If you're in a room with 3 light switches, and only one controls a light bulb in \
                 another room, how would you determine which switch controls the bulb with only \
                 one trip to the other room?",
            )
            .with_duration(120),
            InterviewQuestion::text(
                id(3),
                stage,
                "A company's revenue increased by 20% in Q1, decreased by 15% in Q2, and increased \
                 by 10% in Q3. What's the overall percentage change from the beginning of Q1 to \
                 the end of Q3?",
            )
            .with_duration(90),
        ],
        InterviewStage::NonReasoning => vec![
            InterviewQuestion::text(
                id(1),
                stage,
                "How do you typically approach learning a new technology or skill? Can you give \
                 me an example?",
            )
            .with_duration(90),
            InterviewQuestion::text(
                id(2),
                stage,
                "What's your preferred work environment? Do you work better independently or as \
                 part of a team?",
            )
            .with_duration(60),
            InterviewQuestion::text(
                id(3),
                stage,
                "How do you stay updated with the latest trends and developments in your field?",
            )
            .with_duration(75),
        ],
        InterviewStage::Technical => {
            let primary_skill = profile
                .skills
                .first()
                .map(String::as_str)
                .unwrap_or("programming");
            let project = profile
                .projects
                .first()
                .map(|p| p.name.as_str())
                .unwrap_or("most challenging project");
            vec![
                InterviewQuestion::text(
                    id(1),
                    stage,
                    format!(
                        "Based on your experience with {primary_skill}, can you explain the key \
                         concepts and best practices you follow?"
                    ),
                )
                .with_duration(120),
                InterviewQuestion::code(
                    id(2),
                    stage,
                    "Write a function that finds the two numbers in an array that add up to a \
                     specific target sum. Optimize for time complexity.",
                )
                .with_duration(300)
                .with_keywords(&["algorithm", "optimization", "array", "time complexity"]),
                InterviewQuestion::text(
                    id(3),
                    stage,
                    format!(
                        "Tell me about the {project} you've worked on. What technologies did you \
                         use and what challenges did you face?"
                    ),
                )
                .with_duration(180),
                InterviewQuestion::code(
                    id(4),
                    stage,
                    "Implement a function to reverse a linked list. Explain your approach and \
                     discuss the time and space complexity.",
                )
                .with_duration(240)
                .with_keywords(&["data structures", "linked list", "algorithms"]),
            ]
        }
        InterviewStage::Behavioral => vec![
            InterviewQuestion::text(
                id(1),
                stage,
                "Tell me about a time when you had to work with a difficult team member. How did \
                 you handle the situation and what was the outcome?",
            )
            .with_duration(150)
            .with_keywords(&["teamwork", "conflict resolution", "communication"]),
            InterviewQuestion::text(
                id(2),
                stage,
                "Describe a situation where you had to meet a tight deadline. How did you \
                 prioritize your tasks and manage your time?",
            )
            .with_duration(120)
            .with_keywords(&["time management", "pressure", "prioritization"]),
            InterviewQuestion::text(
                id(3),
                stage,
                "Can you share an example of when you had to learn something completely new for \
                 a project? How did you approach it?",
            )
            .with_duration(135)
            .with_keywords(&["learning", "adaptability", "growth mindset"]),
            InterviewQuestion::text(
                id(4),
                stage,
                "Tell me about a time when you took initiative on a project or proposed an \
                 improvement. What was the result?",
            )
            .with_duration(140)
            .with_keywords(&["leadership", "initiative", "innovation"]),
        ],
    }
}
