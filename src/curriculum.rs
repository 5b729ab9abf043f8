//! Curriculum catalogue: themes, competences and learning outcomes per level and subject.
//!
//! Files live at `<dir>/<LEVEL>/<subject>.json`:
//!
//! ```json
//! { "themes": [{ "name": "Numbers", "competences": ["counts objects up to 20"] }],
//!   "learning_outcomes": ["..."] }
//! ```
//!
//! Missing or malformed files are skipped with a warning; lookups against them simply fail.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

pub const LEVELS: [&str; 3] = ["P1", "P2", "P3"];
pub const SUBJECTS: [&str; 2] = ["mathematics", "english"];

const MAX_REVIEW_SUGGESTIONS: usize = 5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub competences: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectCurriculum {
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub learning_outcomes: Vec<String>,
}

impl SubjectCurriculum {
    pub fn theme_names(&self) -> Vec<String> {
        self.themes.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Boundaries {
    pub level: String,
    pub subject: String,
    pub themes: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub total_themes: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ContentCheck {
    pub is_valid: bool,
    pub level: String,
    pub subject: String,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathCheck {
    pub valid_path: bool,
    pub themes_on_track: Vec<String>,
    pub themes_pending: Vec<String>,
    pub progress_percentage: f64,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub themes: usize,
    pub theme_names: Vec<String>,
    pub competences: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level: String,
    pub subjects: BTreeMap<String, SubjectSummary>,
    pub total_themes: usize,
}

/// In-memory catalogue keyed by level then subject.
#[derive(Clone, Debug, Default)]
pub struct Curriculum {
    levels: BTreeMap<String, BTreeMap<String, SubjectCurriculum>>,
}

impl Curriculum {
    /// Load every known level/subject pair found under `dir`.
    #[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let mut curriculum = Curriculum::default();
        for level in LEVELS {
            for subject in SUBJECTS {
                let path = dir.join(level).join(format!("{}.json", subject));
                let raw = match std::fs::read_to_string(&path) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(target: "toto_backend", path = %path.display(), error = %e, "Curriculum file unavailable");
                        continue;
                    }
                };
                match serde_json::from_str::<SubjectCurriculum>(&raw) {
                    Ok(doc) => curriculum.insert(level, subject, doc),
                    Err(e) => {
                        warn!(target: "toto_backend", path = %path.display(), error = %e, "Curriculum file is not valid JSON");
                    }
                }
            }
        }
        let loaded: usize = curriculum.levels.values().map(|s| s.len()).sum();
        info!(target: "toto_backend", loaded, "Curriculum loaded");
        curriculum
    }

    pub fn insert(&mut self, level: &str, subject: &str, doc: SubjectCurriculum) {
        self.levels
            .entry(norm_level(level))
            .or_default()
            .insert(norm_subject(subject), doc);
    }

    fn subject(&self, level: &str, subject: &str) -> Option<&SubjectCurriculum> {
        self.levels.get(&norm_level(level))?.get(&norm_subject(subject))
    }

    pub fn is_valid_level(&self, level: &str) -> bool {
        self.levels.contains_key(&norm_level(level))
    }

    pub fn is_valid_subject(&self, level: &str, subject: &str) -> bool {
        self.subject(level, subject).is_some()
    }

    /// Theme names are matched exactly.
    pub fn is_valid_theme(&self, level: &str, subject: &str, theme: &str) -> bool {
        self.subject(level, subject)
            .map(|s| s.themes.iter().any(|t| t.name == theme))
            .unwrap_or(false)
    }

    pub fn boundaries(&self, level: &str, subject: &str) -> Option<Boundaries> {
        let s = self.subject(level, subject)?;
        Some(Boundaries {
            level: norm_level(level),
            subject: norm_subject(subject),
            themes: s.theme_names(),
            learning_outcomes: s.learning_outcomes.clone(),
            total_themes: s.themes.len(),
        })
    }

    pub fn theme_competences(&self, level: &str, subject: &str, theme: &str) -> Vec<String> {
        self.subject(level, subject)
            .and_then(|s| s.themes.iter().find(|t| t.name == theme))
            .map(|t| t.competences.clone())
            .unwrap_or_default()
    }

    pub fn all_themes(&self, level: &str, subject: &str) -> Vec<String> {
        self.subject(level, subject).map(|s| s.theme_names()).unwrap_or_default()
    }

    /// Check that generated content stays inside the level's scope.
    pub fn validate_content(&self, level: &str, subject: &str, content: &str) -> ContentCheck {
        let mut check = ContentCheck {
            is_valid: self.is_valid_subject(level, subject),
            level: norm_level(level),
            subject: norm_subject(subject),
            ..Default::default()
        };
        if !check.is_valid {
            check.warnings.push("Invalid level or subject combination".into());
            return check;
        }
        let terms = detect_advanced_terms(level, subject, content);
        if !terms.is_empty() {
            check.warnings.push(format!(
                "Content includes terms possibly beyond {} scope: {}",
                check.level,
                terms.join(", ")
            ));
            check.recommendations.push("Simplify content or add explanations".into());
        }
        check
    }

    pub fn recommended_next_theme(&self, level: &str, subject: &str, current_theme: &str) -> Option<String> {
        let s = self.subject(level, subject)?;
        let idx = s.themes.iter().position(|t| t.name == current_theme)?;
        s.themes.get(idx + 1).map(|t| t.name.clone())
    }

    /// Compare completed themes against the prescribed order.
    pub fn validate_learning_path(&self, level: &str, subject: &str, themes_completed: &[String]) -> PathCheck {
        let all = self.all_themes(level, subject);
        let mut warnings = Vec::new();
        for (i, theme) in themes_completed.iter().enumerate() {
            if let Some(expected) = all.get(i) {
                if theme != expected {
                    warnings.push(format!("Theme order incorrect at position {}", i));
                }
            }
        }
        let progress_percentage = if all.is_empty() {
            0.0
        } else {
            crate::tracker::round2(100.0 * themes_completed.len() as f64 / all.len() as f64)
        };
        PathCheck {
            valid_path: warnings.is_empty(),
            themes_on_track: themes_completed.to_vec(),
            themes_pending: all.iter().skip(themes_completed.len()).cloned().collect(),
            progress_percentage,
            warnings,
        }
    }

    /// Point weak topics at the competences that mention them.
    pub fn suggest_review_areas(&self, level: &str, subject: &str, weak_topics: &[String]) -> Vec<String> {
        let Some(s) = self.subject(level, subject) else {
            return Vec::new();
        };
        let needles: Vec<String> = weak_topics.iter().map(|t| t.to_lowercase()).collect();
        s.themes
            .iter()
            .filter_map(|theme| {
                let relevant: Vec<&str> = theme
                    .competences
                    .iter()
                    .filter(|c| {
                        let c = c.to_lowercase();
                        needles.iter().any(|n| c.contains(n.as_str()))
                    })
                    .take(2)
                    .map(String::as_str)
                    .collect();
                if relevant.is_empty() {
                    None
                } else {
                    Some(format!("Review {}: {}", theme.name, relevant.join(", ")))
                }
            })
            .take(MAX_REVIEW_SUGGESTIONS)
            .collect()
    }

    pub fn summary(&self, level: &str) -> Option<LevelSummary> {
        let subjects = self.levels.get(&norm_level(level))?;
        let mut out = BTreeMap::new();
        let mut total_themes = 0;
        for (name, doc) in subjects {
            total_themes += doc.themes.len();
            out.insert(
                name.clone(),
                SubjectSummary {
                    themes: doc.themes.len(),
                    theme_names: doc.theme_names(),
                    competences: doc.learning_outcomes.len(),
                },
            );
        }
        Some(LevelSummary { level: norm_level(level), subjects: out, total_themes })
    }
}

/// Vocabulary considered out of scope for a level/subject.
fn advanced_terms(level: &str, subject: &str) -> &'static [&'static str] {
    match (level, subject) {
        ("P1", "mathematics") => &["calculus", "derivative", "integral", "algebra", "quadratic"],
        ("P1", "english") => &["thesis", "seminar", "academic", "philosophical"],
        ("P2", "mathematics") => &["calculus", "derivative", "integral"],
        ("P2", "english") => &["thesis", "seminar"],
        ("P3", "mathematics") => &["differential", "integral"],
        ("P3", "english") => &["post-graduate", "thesis"],
        _ => &[],
    }
}

pub fn detect_advanced_terms(level: &str, subject: &str, content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    advanced_terms(&norm_level(level), &norm_subject(subject))
        .iter()
        .filter(|t| lower.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

fn norm_level(level: &str) -> String {
    level.trim().to_uppercase()
}

fn norm_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Curriculum {
        let mut c = Curriculum::default();
        c.insert(
            "P1",
            "mathematics",
            SubjectCurriculum {
                themes: vec![
                    Theme { name: "Numbers".into(), competences: vec!["Counts objects up to 20".into(), "Reads numbers".into()] },
                    Theme { name: "Addition".into(), competences: vec!["Adds numbers up to 10".into()] },
                    Theme { name: "Shapes".into(), competences: vec!["Names circles and squares".into()] },
                ],
                learning_outcomes: vec!["Uses numbers in daily life".into()],
            },
        );
        c
    }

    #[test]
    fn membership_is_case_normalised_for_level_and_subject() {
        let c = sample();
        assert!(c.is_valid_level("p1"));
        assert!(c.is_valid_subject("P1", "Mathematics"));
        assert!(c.is_valid_theme("p1", "mathematics", "Addition"));
        assert!(!c.is_valid_theme("P1", "mathematics", "addition"));
        assert!(!c.is_valid_subject("P2", "mathematics"));
    }

    #[test]
    fn next_theme_follows_file_order() {
        let c = sample();
        assert_eq!(c.recommended_next_theme("P1", "mathematics", "Numbers").as_deref(), Some("Addition"));
        assert_eq!(c.recommended_next_theme("P1", "mathematics", "Shapes"), None);
        assert_eq!(c.recommended_next_theme("P1", "mathematics", "Unknown"), None);
    }

    #[test]
    fn advanced_terms_raise_warnings() {
        let c = sample();
        let check = c.validate_content("P1", "mathematics", "Solve this Quadratic equation");
        assert!(check.is_valid);
        assert_eq!(check.warnings.len(), 1);
        assert!(check.warnings[0].contains("quadratic"));

        let bad = c.validate_content("P9", "mathematics", "anything");
        assert!(!bad.is_valid);
    }

    #[test]
    fn learning_path_detects_order_problems() {
        let c = sample();
        let check = c.validate_learning_path("P1", "mathematics", &["Numbers".into(), "Shapes".into()]);
        assert!(!check.valid_path);
        assert_eq!(check.themes_pending, vec!["Shapes".to_string()]);
        assert_eq!(check.progress_percentage, 66.67);
    }

    #[test]
    fn review_suggestions_match_competences() {
        let c = sample();
        let s = c.suggest_review_areas("P1", "mathematics", &["numbers".into()]);
        assert_eq!(s, vec![
            "Review Numbers: Reads numbers".to_string(),
            "Review Addition: Adds numbers up to 10".to_string(),
        ]);
        assert!(c.suggest_review_areas("P3", "english", &["numbers".into()]).is_empty());
    }

    #[test]
    fn load_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("P1");
        std::fs::create_dir_all(&p1).unwrap();
        std::fs::write(
            p1.join("english.json"),
            r#"{"themes":[{"name":"Our School","competences":["Names school objects"]}],"learning_outcomes":["Listens"]}"#,
        )
        .unwrap();
        std::fs::write(p1.join("mathematics.json"), "not json").unwrap();

        let c = Curriculum::load(dir.path());
        assert!(c.is_valid_theme("P1", "english", "Our School"));
        assert!(!c.is_valid_subject("P1", "mathematics"));
        let summary = c.summary("P1").unwrap();
        assert_eq!(summary.total_themes, 1);
        assert!(c.summary("P3").is_none());
    }
}
