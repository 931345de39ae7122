//! Post-interview feedback report.

use serde::Serialize;
use uuid::Uuid;

use super::model::InterviewSession;
use super::stage::InterviewStage;

/// Score band shown next to each section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    NeedsWork,
}

impl ScoreBand {
    pub fn for_score(score: u8) -> Self {
        match score {
            85.. => ScoreBand::Excellent,
            70..=84 => ScoreBand::Good,
            _ => ScoreBand::NeedsWork,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSection {
    pub stage: InterviewStage,
    /// Display name, e.g. "Non Reasoning".
    pub label: String,
    pub score: u8,
    pub band: ScoreBand,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub questions_answered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackReport {
    pub session_id: Uuid,
    pub overall_score: u8,
    pub overall_band: ScoreBand,
    pub duration_minutes: i64,
    pub questions_answered: usize,
    pub sections: Vec<FeedbackSection>,
}

struct SectionTemplate {
    score: u8,
    summary: &'static str,
    strengths: &'static [&'static str],
    improvements: &'static [&'static str],
}

fn template(stage: InterviewStage) -> SectionTemplate {
    match stage {
        InterviewStage::Introductory => SectionTemplate {
            score: 85,
            summary: "Great introduction! You clearly articulated your background and career goals.",
            strengths: &[
                "Clear communication",
                "Confident presentation",
                "Well-structured responses",
            ],
            improvements: &[
                "Could provide more specific examples",
                "Elaborate on future goals",
            ],
        },
        InterviewStage::Reasoning => SectionTemplate {
            score: 78,
            summary: "Good logical thinking approach. You worked through problems systematically.",
            strengths: &[
                "Systematic approach",
                "Clear problem breakdown",
                "Good analytical skills",
            ],
            improvements: &["Consider edge cases", "Optimize solution approaches"],
        },
        InterviewStage::NonReasoning => SectionTemplate {
            score: 82,
            summary: "Excellent personality fit and work style awareness.",
            strengths: &[
                "Self-awareness",
                "Team collaboration mindset",
                "Learning attitude",
            ],
            improvements: &["More specific examples of adaptability"],
        },
        InterviewStage::Technical => SectionTemplate {
            score: 75,
            summary: "Solid technical knowledge with room for optimization in coding solutions.",
            strengths: &[
                "Good coding fundamentals",
                "Problem understanding",
                "Clean code structure",
            ],
            improvements: &[
                "Algorithm optimization",
                "Time complexity analysis",
                "Edge case handling",
            ],
        },
        InterviewStage::Behavioral => SectionTemplate {
            score: 88,
            summary: "Outstanding behavioral responses with excellent STAR method usage.",
            strengths: &[
                "STAR method application",
                "Real examples",
                "Leadership qualities",
                "Conflict resolution",
            ],
            improvements: &["More quantified results"],
        },
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl FeedbackReport {
    /// Build the report for a completed session.
    pub fn from_session(session: &InterviewSession) -> Self {
        let sections: Vec<FeedbackSection> = InterviewStage::ALL
            .iter()
            .map(|&stage| {
                let t = template(stage);
                FeedbackSection {
                    stage,
                    label: stage.label().to_string(),
                    score: t.score,
                    band: ScoreBand::for_score(t.score),
                    summary: t.summary.to_string(),
                    strengths: strings(t.strengths),
                    improvements: strings(t.improvements),
                    questions_answered: session
                        .responses
                        .iter()
                        .filter(|r| r.stage == stage)
                        .count(),
                }
            })
            .collect();

        let total: u32 = sections.iter().map(|s| u32::from(s.score)).sum();
        let overall_score = (f64::from(total) / sections.len() as f64).round() as u8;
        let end = session.end_time.unwrap_or(session.start_time);

        Self {
            session_id: session.id,
            overall_score,
            overall_band: ScoreBand::for_score(overall_score),
            duration_minutes: (end - session.start_time).num_minutes(),
            questions_answered: session.responses.len(),
            sections,
        }
    }
}
