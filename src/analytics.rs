//! Progress reporting for teachers and parents, built on the stored aggregates.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::analyzer::{PerformanceAnalyzer, TrajectoryReport, DEFAULT_WEAK_THRESHOLD};
use crate::curriculum::{Curriculum, PathCheck};
use crate::domain::{DifficultyProfile, Student, StudyKey, ThemeProgress, TopicMastery};
use crate::error::{TutorError, TutorResult};
use crate::store::{PerformanceStore, SqliteStore};
use crate::tracker::round2;

/// Theme accuracy at which a theme counts as completed.
const THEME_COMPLETED: f64 = 80.0;
const STRONG_AREA: f64 = 80.0;
const PARENT_STRENGTH: f64 = 85.0;
const PARENT_IMPROVEMENT: f64 = 60.0;
const PER_SUBJECT_ITEMS: usize = 2;
const REPORT_ITEMS: usize = 5;

const HOME_ACTIVITIES: [&str; 5] = [
    "Practice counting with objects at home (stones, fruits, toys)",
    "Read simple stories together with family members",
    "Play word games or spelling games",
    "Solve simple math problems using daily items",
    "Create a learning journal to record progress",
];

const NEXT_STEPS: [&str; 4] = [
    "Complete remaining themes in current level",
    "Review weak areas identified in progress report",
    "Practice at least 3 times per week for best results",
    "Request feedback from teacher on specific challenges",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MasteryBand {
    Advanced,
    Proficient,
    Developing,
    Beginning,
}

impl MasteryBand {
    pub fn from_accuracy(pct: f64) -> Self {
        if pct >= 90.0 {
            MasteryBand::Advanced
        } else if pct >= 75.0 {
            MasteryBand::Proficient
        } else if pct >= 60.0 {
            MasteryBand::Developing
        } else {
            MasteryBand::Beginning
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MasteryBand::Advanced => "Advanced",
            MasteryBand::Proficient => "Proficient",
            MasteryBand::Developing => "Developing",
            MasteryBand::Beginning => "Beginning",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectProgress {
    pub total_themes: usize,
    pub themes_completed: usize,
    pub average_accuracy: f64,
    pub progress_percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LearningSummary {
    pub total_attempts: i64,
    pub total_correct: i64,
    pub overall_accuracy: f64,
    pub mastery_level: MasteryBand,
}

#[derive(Clone, Debug, Serialize)]
pub struct Dashboard {
    pub student_id: i64,
    pub name: String,
    pub grade: String,
    pub date_joined: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
    /// level -> subject -> progress
    pub level_progress: BTreeMap<String, BTreeMap<String, SubjectProgress>>,
    pub learning_summary: LearningSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubjectAnalysis {
    pub student_id: i64,
    pub level: String,
    pub subject: String,
    pub themes_progress: Vec<ThemeProgress>,
    pub topic_mastery: Vec<TopicMastery>,
    pub weak_areas: Vec<TopicMastery>,
    pub strong_areas: Vec<TopicMastery>,
    pub average_accuracy: f64,
    pub recommendation: &'static str,
    pub difficulty: Option<DifficultyProfile>,
    pub trajectory: Option<TrajectoryReport>,
    /// Completed themes checked against the prescribed order.
    pub learning_path: PathCheck,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParentReport {
    pub student_name: String,
    pub grade: String,
    pub report_date: DateTime<Utc>,
    pub overall_progress: MasteryBand,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommended_home_activities: Vec<String>,
    pub next_steps: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Text,
}

pub struct ProgressAnalytics<'a> {
    store: &'a SqliteStore,
    curriculum: &'a Curriculum,
    analyzer: PerformanceAnalyzer,
}

impl<'a> ProgressAnalytics<'a> {
    pub fn new(store: &'a SqliteStore, curriculum: &'a Curriculum) -> Self {
        Self { store, curriculum, analyzer: PerformanceAnalyzer::default() }
    }

    fn student(&self, student_id: i64) -> TutorResult<Student> {
        self.store
            .get_student(student_id)?
            .ok_or_else(|| TutorError::NotFound(format!("student {}", student_id)))
    }

    #[instrument(level = "info", skip(self))]
    pub fn dashboard(&self, student_id: i64) -> TutorResult<Dashboard> {
        let student = self.student(student_id)?;
        let mut level_progress: BTreeMap<String, BTreeMap<String, SubjectProgress>> = BTreeMap::new();
        let mut total_attempts = 0;
        let mut total_correct = 0;
        let mut accuracies = Vec::new();

        for key in self.store.studied_keys(student_id)? {
            let progress = self.store.get_progress(&key)?;
            if progress.is_empty() {
                continue;
            }
            for p in &progress {
                total_attempts += p.total_attempts;
                total_correct += p.correct_attempts;
                accuracies.push(p.accuracy_rate);
            }
            level_progress
                .entry(key.level.clone())
                .or_default()
                .insert(key.subject.clone(), subject_progress(&progress));
        }

        let overall = mean(&accuracies);
        Ok(Dashboard {
            student_id,
            name: student.name,
            grade: student.grade,
            date_joined: student.date_created,
            last_active: student.last_active,
            level_progress,
            learning_summary: LearningSummary {
                total_attempts,
                total_correct,
                overall_accuracy: round2(overall),
                mastery_level: MasteryBand::from_accuracy(overall),
            },
        })
    }

    #[instrument(level = "info", skip(self))]
    pub fn subject_analysis(&self, student_id: i64, level: &str, subject: &str) -> TutorResult<SubjectAnalysis> {
        let key = StudyKey::new(student_id, level, subject);
        let themes_progress = self.store.get_progress(&key)?;
        if themes_progress.is_empty() {
            return Err(TutorError::NotFound(format!("no progress recorded for {}", key)));
        }
        let topic_mastery = self.store.get_topic_mastery(&key)?;
        let weak_areas = self.analyzer.identify_weak_areas(&topic_mastery, DEFAULT_WEAK_THRESHOLD);
        let strong_areas = topic_mastery
            .iter()
            .filter(|t| t.mastery_percentage >= STRONG_AREA)
            .cloned()
            .collect();
        let average = mean(&themes_progress.iter().map(|p| p.accuracy_rate).collect::<Vec<_>>());

        let mut completed: Vec<&ThemeProgress> =
            themes_progress.iter().filter(|p| p.accuracy_rate >= THEME_COMPLETED).collect();
        completed.sort_by_key(|p| p.last_attempted);
        let completed: Vec<String> = completed.into_iter().map(|p| p.theme.clone()).collect();
        let learning_path = self.curriculum.validate_learning_path(&key.level, &key.subject, &completed);

        // Two windows of history so the trajectory can compare them.
        let window = self.analyzer.window_size();
        let recent = self.store.get_recent_responses(&key, window * 2)?;

        Ok(SubjectAnalysis {
            student_id,
            level: key.level.clone(),
            subject: key.subject.clone(),
            weak_areas,
            strong_areas,
            average_accuracy: round2(average),
            recommendation: recommendation(average),
            difficulty: self.store.get_difficulty_profile(&key)?,
            trajectory: self.analyzer.classify(&recent),
            learning_path,
            themes_progress,
            topic_mastery,
        })
    }

    #[instrument(level = "info", skip(self))]
    pub fn parent_report(&self, student_id: i64) -> TutorResult<ParentReport> {
        let dashboard = self.dashboard(student_id)?;
        let mut strengths = Vec::new();
        let mut improvements = Vec::new();

        for key in self.store.studied_keys(student_id)? {
            let label = |t: &TopicMastery| format!("{} ({} {})", t.topic, key.level, title_case(&key.subject));
            let mastery = self.store.get_topic_mastery(&key)?;
            strengths.extend(
                mastery
                    .iter()
                    .filter(|t| t.mastery_percentage >= PARENT_STRENGTH)
                    .take(PER_SUBJECT_ITEMS)
                    .map(label),
            );
            let weak = self.store.get_weak_topics(&key, PARENT_IMPROVEMENT)?;
            improvements.extend(weak.iter().take(PER_SUBJECT_ITEMS).map(label));
        }
        strengths.truncate(REPORT_ITEMS);
        improvements.truncate(REPORT_ITEMS);

        Ok(ParentReport {
            student_name: dashboard.name,
            grade: dashboard.grade,
            report_date: Utc::now(),
            overall_progress: dashboard.learning_summary.mastery_level,
            strengths,
            areas_for_improvement: improvements,
            recommended_home_activities: HOME_ACTIVITIES.iter().map(|s| s.to_string()).collect(),
            next_steps: NEXT_STEPS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Dashboard rendered as pretty JSON or as a plain-text report.
    pub fn export(&self, student_id: i64, format: ReportFormat) -> TutorResult<String> {
        let dashboard = self.dashboard(student_id)?;
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&dashboard)?),
            ReportFormat::Text => Ok(format_as_text(&dashboard)),
        }
    }
}

fn subject_progress(progress: &[ThemeProgress]) -> SubjectProgress {
    let total = progress.len();
    let completed = progress.iter().filter(|p| p.accuracy_rate >= THEME_COMPLETED).count();
    let average = mean(&progress.iter().map(|p| p.accuracy_rate).collect::<Vec<_>>());
    SubjectProgress {
        total_themes: total,
        themes_completed: completed,
        average_accuracy: round2(average),
        progress_percentage: if total == 0 { 0.0 } else { round2(100.0 * completed as f64 / total as f64) },
    }
}

fn recommendation(average_accuracy: f64) -> &'static str {
    if average_accuracy >= 85.0 {
        "Great progress! Ready to move to next level."
    } else if average_accuracy >= 70.0 {
        "Good progress. Continue practicing to improve accuracy."
    } else if average_accuracy >= 50.0 {
        "Needs more practice in weak areas. Consider review sessions."
    } else {
        "Significant support needed. Recommend focused intervention."
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_as_text(d: &Dashboard) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "STUDENT PROGRESS REPORT");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Student Id: {}", d.student_id);
    let _ = writeln!(out, "Name: {}", d.name);
    let _ = writeln!(out, "Grade: {}", d.grade);
    let _ = writeln!(out, "Date Joined: {}", d.date_joined.format("%Y-%m-%d"));
    match d.last_active {
        Some(t) => {
            let _ = writeln!(out, "Last Active: {}", t.format("%Y-%m-%d %H:%M"));
        }
        None => {
            let _ = writeln!(out, "Last Active: never");
        }
    }
    for (level, subjects) in &d.level_progress {
        for (subject, p) in subjects {
            let _ = writeln!(
                out,
                "{} {}: {}/{} themes completed, average accuracy {:.2}%",
                level,
                title_case(subject),
                p.themes_completed,
                p.total_themes,
                p.average_accuracy
            );
        }
    }
    let s = &d.learning_summary;
    let _ = writeln!(
        out,
        "Overall: {} correct of {} attempts, {:.2}% ({})",
        s.total_correct,
        s.total_attempts,
        s.overall_accuracy,
        s.mastery_level.as_str()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.add_student("Nakato", "P2").unwrap();
        let maths = StudyKey::new(id, "P2", "mathematics");
        for i in 0..10 {
            store.update_progress(&maths, "Numbers", true).unwrap();
            store.update_topic_mastery(&maths, "place value", true).unwrap();
            store.update_progress(&maths, "Money", i < 4).unwrap();
            store.update_topic_mastery(&maths, "change", i < 4).unwrap();
        }
        (store, id)
    }

    #[test]
    fn mastery_bands_follow_thresholds() {
        assert_eq!(MasteryBand::from_accuracy(90.0), MasteryBand::Advanced);
        assert_eq!(MasteryBand::from_accuracy(75.0), MasteryBand::Proficient);
        assert_eq!(MasteryBand::from_accuracy(60.0), MasteryBand::Developing);
        assert_eq!(MasteryBand::from_accuracy(59.99), MasteryBand::Beginning);
    }

    #[test]
    fn dashboard_aggregates_progress() {
        let (store, id) = seeded();
        let d = ProgressAnalytics::new(&store, &Curriculum::default()).dashboard(id).unwrap();
        let maths = &d.level_progress["P2"]["mathematics"];
        assert_eq!(maths.total_themes, 2);
        assert_eq!(maths.themes_completed, 1);
        assert_eq!(maths.average_accuracy, 70.0);
        assert_eq!(maths.progress_percentage, 50.0);
        assert_eq!(d.learning_summary.total_attempts, 20);
        assert_eq!(d.learning_summary.total_correct, 14);
        assert_eq!(d.learning_summary.mastery_level, MasteryBand::Developing);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(ProgressAnalytics::new(&store, &Curriculum::default()).dashboard(9), Err(TutorError::NotFound(_))));
    }

    #[test]
    fn subject_analysis_splits_weak_and_strong() {
        let (store, id) = seeded();
        let a = ProgressAnalytics::new(&store, &Curriculum::default()).subject_analysis(id, "p2", "Mathematics").unwrap();
        assert_eq!(a.weak_areas.len(), 1);
        assert_eq!(a.weak_areas[0].topic, "change");
        assert_eq!(a.strong_areas[0].topic, "place value");
        assert_eq!(a.recommendation, "Good progress. Continue practicing to improve accuracy.");
        assert!(a.difficulty.is_none());
        assert!(a.trajectory.is_none());
        assert_eq!(a.learning_path.themes_on_track, vec!["Numbers".to_string()]);
    }

    #[test]
    fn parent_report_labels_topics_with_subject() {
        let (store, id) = seeded();
        let r = ProgressAnalytics::new(&store, &Curriculum::default()).parent_report(id).unwrap();
        assert_eq!(r.strengths, vec!["place value (P2 Mathematics)".to_string()]);
        assert_eq!(r.areas_for_improvement, vec!["change (P2 Mathematics)".to_string()]);
        assert_eq!(r.recommended_home_activities.len(), 5);
    }

    #[test]
    fn text_export_has_header_and_summary() {
        let (store, id) = seeded();
        let text = ProgressAnalytics::new(&store, &Curriculum::default()).export(id, ReportFormat::Text).unwrap();
        assert!(text.starts_with(&"=".repeat(60)));
        assert!(text.contains("Name: Nakato"));
        assert!(text.contains("P2 Mathematics: 1/2 themes completed"));
        let json = ProgressAnalytics::new(&store, &Curriculum::default()).export(id, ReportFormat::Json).unwrap();
        assert!(json.contains("\"learning_summary\""));
    }
}
