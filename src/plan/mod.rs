//! Plan module - the workout plan a trainer writes for a student
//!
//! Plan → routines ("fichas") → sections → exercises. Order matters at every
//! level and is what the student sees.

pub mod import;
pub mod tree;
pub mod video;

pub use import::Importer;
pub use tree::{Direction, Outcome, PlanTree};

use serde::{Deserialize, Serialize};

/// Details shown when no set/rep scheme was given
pub const DETAILS_TBD: &str = "A definir";

fn default_details() -> String {
    DETAILS_TBD.to_string()
}

/// Full workout assignment for one student
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub routines: Vec<Routine>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn routine(&self, id: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.id == id)
    }

    pub fn routine_by_name(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.name == name)
    }

    /// Look a routine up by id first, then by name (what people type on the CLI)
    pub fn find_routine(&self, key: &str) -> Option<&Routine> {
        self.routine(key).or_else(|| self.routine_by_name(key.trim()))
    }

    pub fn exercise_count(&self) -> usize {
        self.routines.iter().map(Routine::exercise_count).sum()
    }
}

/// A named tab of the plan ("ficha")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Routine {
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn section_mut(&mut self, title: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.title == title)
    }

    pub fn exercise_count(&self) -> usize {
        self.sections.iter().map(|s| s.exercises.len()).sum()
    }
}

/// Headed list of exercises inside a routine. The title is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            exercises: Vec::new(),
        }
    }
}

/// Single exercise card. Identified by its position in the section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    #[serde(default = "default_details")]
    pub details: String,
    /// Empty string means no video
    #[serde(default)]
    pub video_url: String,
}

impl Exercise {
    pub fn new(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: details.into(),
            video_url: String::new(),
        }
    }

    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.video_url = url.into();
        self
    }

    pub fn has_video(&self) -> bool {
        !self.video_url.is_empty()
    }
}

/// Remote document stored per student: the plan and the trainer it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    #[serde(default)]
    pub plan: Plan,
    pub trainer_id: String,
}

impl PlanDocument {
    pub fn new(plan: Plan, trainer_id: impl Into<String>) -> Self {
        Self {
            plan,
            trainer_id: trainer_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_wire_shape() {
        let doc = PlanDocument::new(
            Plan {
                routines: vec![Routine {
                    id: "ficha-1".to_string(),
                    name: "A".to_string(),
                    sections: vec![Section {
                        title: "Legs".to_string(),
                        exercises: vec![Exercise::new("Squat", "3x10").with_video("https://youtu.be/abc")],
                    }],
                }],
            },
            "coach-1",
        );

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["trainerId"], "coach-1");
        assert_eq!(json["plan"]["routines"][0]["sections"][0]["exercises"][0]["videoUrl"], "https://youtu.be/abc");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let doc: PlanDocument = serde_json::from_str(
            r#"{"trainerId":"coach-1","plan":{"routines":[{"id":"x","name":"A","sections":[{"title":"Legs","exercises":[{"name":"Squat"}]}]}]}}"#,
        )
        .unwrap();

        let exercise = &doc.plan.routines[0].sections[0].exercises[0];
        assert_eq!(exercise.details, DETAILS_TBD);
        assert!(!exercise.has_video());

        let bare: PlanDocument = serde_json::from_str(r#"{"trainerId":"coach-1"}"#).unwrap();
        assert!(bare.plan.is_empty());
    }

    #[test]
    fn test_find_routine_by_id_or_name() {
        let plan = Plan {
            routines: vec![Routine {
                id: "ficha-1".to_string(),
                name: "Upper".to_string(),
                sections: vec![],
            }],
        };
        assert!(plan.find_routine("ficha-1").is_some());
        assert!(plan.find_routine("Upper").is_some());
        assert!(plan.find_routine("Lower").is_none());
    }
}
