//! Plan tree editing - structural edits on the loaded plan
//!
//! Every edit either applies completely or leaves the tree untouched.
//! `Outcome::Unchanged` marks the designed no-ops (boundary moves, removing
//! something that is not there) so callers know there is nothing to push.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use tracing::{debug, warn};

use super::{DETAILS_TBD, Exercise, Plan, Routine, Section};
use crate::error::{ImportError, PlanError};

/// Result of an accepted edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

impl Outcome {
    pub fn is_changed(self) -> bool {
        self == Outcome::Changed
    }
}

/// Which way a section moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("expected 'up' or 'down', got '{}'", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Fresh routine id, unique among `existing`
pub fn new_routine_id(existing: &[Routine]) -> String {
    loop {
        let id = format!(
            "ficha-{:x}-{:08x}",
            Utc::now().timestamp_millis(),
            rand::random::<u32>()
        );
        if !existing.iter().any(|r| r.id == id) {
            return id;
        }
    }
}

fn required(value: &str, field: &'static str) -> Result<String, PlanError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PlanError::EmptyField(field));
    }
    Ok(value.to_string())
}

/// In-memory plan being viewed or edited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanTree {
    plan: Plan,
}

impl PlanTree {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }

    fn routine_mut(&mut self, id: &str) -> Option<&mut Routine> {
        self.plan.routines.iter_mut().find(|r| r.id == id)
    }

    /// Append a new empty routine with a fresh id
    pub fn add_routine(&mut self, name: &str) -> Result<Outcome, PlanError> {
        let name = required(name, "routine name")?;
        if self.plan.routine_by_name(&name).is_some() {
            return Err(PlanError::DuplicateRoutine(name));
        }

        let id = new_routine_id(&self.plan.routines);
        debug!("Adding routine {} ({})", name, id);
        self.plan.routines.push(Routine {
            id,
            name,
            sections: Vec::new(),
        });
        Ok(Outcome::Changed)
    }

    /// Caller confirms before calling; missing id is a no-op
    pub fn remove_routine(&mut self, id: &str) -> Outcome {
        let before = self.plan.routines.len();
        self.plan.routines.retain(|r| r.id != id);
        if self.plan.routines.len() == before {
            Outcome::Unchanged
        } else {
            Outcome::Changed
        }
    }

    pub fn add_section(&mut self, routine_id: &str, title: &str) -> Result<Outcome, PlanError> {
        let title = required(title, "section title")?;
        let routine = self
            .routine_mut(routine_id)
            .ok_or_else(|| PlanError::RoutineNotFound(routine_id.to_string()))?;
        if routine.section(&title).is_some() {
            return Err(PlanError::DuplicateSection(title));
        }

        routine.sections.push(Section::new(title));
        Ok(Outcome::Changed)
    }

    /// Caller confirms before calling; missing routine or section is a no-op
    pub fn remove_section(&mut self, routine_id: &str, title: &str) -> Outcome {
        let title = title.trim();
        let Some(routine) = self.routine_mut(routine_id) else {
            return Outcome::Unchanged;
        };
        let before = routine.sections.len();
        routine.sections.retain(|s| s.title != title);
        if routine.sections.len() == before {
            Outcome::Unchanged
        } else {
            Outcome::Changed
        }
    }

    /// Swap a section with its neighbour. Moving past either end does nothing.
    pub fn move_section(&mut self, routine_id: &str, title: &str, direction: Direction) -> Outcome {
        let title = title.trim();
        let Some(routine) = self.routine_mut(routine_id) else {
            return Outcome::Unchanged;
        };
        let Some(index) = routine.sections.iter().position(|s| s.title == title) else {
            return Outcome::Unchanged;
        };

        let new_index = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => Some(index + 1).filter(|i| *i < routine.sections.len()),
        };
        match new_index {
            Some(new_index) => {
                routine.sections.swap(index, new_index);
                Outcome::Changed
            }
            None => {
                debug!("Section {} is already at the {} edge", title, direction);
                Outcome::Unchanged
            }
        }
    }

    /// Append an exercise. Name is required; empty details fall back to the placeholder.
    pub fn add_exercise(
        &mut self,
        routine_id: &str,
        section_title: &str,
        exercise: Exercise,
    ) -> Result<Outcome, PlanError> {
        let name = required(&exercise.name, "exercise name")?;
        let details = match exercise.details.trim() {
            "" => DETAILS_TBD.to_string(),
            details => details.to_string(),
        };
        let video_url = exercise.video_url.trim().to_string();
        let section_title = section_title.trim();

        let section = self
            .routine_mut(routine_id)
            .ok_or_else(|| PlanError::RoutineNotFound(routine_id.to_string()))?
            .section_mut(section_title)
            .ok_or_else(|| PlanError::SectionNotFound(section_title.to_string()))?;

        section.exercises.push(Exercise {
            name,
            details,
            video_url,
        });
        Ok(Outcome::Changed)
    }

    /// Remove by position. Later exercises shift down by one.
    pub fn remove_exercise(&mut self, routine_id: &str, section_title: &str, index: usize) -> Outcome {
        let section_title = section_title.trim();
        let Some(section) = self
            .routine_mut(routine_id)
            .and_then(|r| r.section_mut(section_title))
        else {
            return Outcome::Unchanged;
        };

        if index >= section.exercises.len() {
            warn!(
                "Exercise index {} out of range for section {} ({} exercises)",
                index,
                section_title,
                section.exercises.len()
            );
            return Outcome::Unchanged;
        }
        section.exercises.remove(index);
        Outcome::Changed
    }

    /// Append every routine of an imported plan, or nothing at all
    pub fn apply_import(&mut self, imported: Plan) -> Result<Outcome, ImportError> {
        if imported.is_empty() {
            return Err(ImportError::Empty);
        }
        for (i, routine) in imported.routines.iter().enumerate() {
            let clashes_existing = self.plan.routine_by_name(&routine.name).is_some();
            let clashes_sibling = imported.routines[..i].iter().any(|r| r.name == routine.name);
            if clashes_existing || clashes_sibling {
                return Err(ImportError::Conflict(routine.name.clone()));
            }
        }

        for mut routine in imported.routines {
            if self.plan.routine(&routine.id).is_some() {
                routine.id = new_routine_id(&self.plan.routines);
            }
            self.plan.routines.push(routine);
        }
        Ok(Outcome::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_tree(sections: &[&str]) -> (PlanTree, String) {
        let mut tree = PlanTree::default();
        tree.add_routine("A").unwrap();
        let id = tree.plan().routines[0].id.clone();
        for title in sections {
            tree.add_section(&id, title).unwrap();
        }
        (tree, id)
    }

    fn titles(tree: &PlanTree, routine_id: &str) -> Vec<String> {
        tree.plan()
            .routine(routine_id)
            .unwrap()
            .sections
            .iter()
            .map(|s| s.title.clone())
            .collect()
    }

    #[test]
    fn test_add_routine() {
        let mut tree = PlanTree::default();
        assert_eq!(tree.add_routine("Upper"), Ok(Outcome::Changed));
        assert_eq!(tree.add_routine("Lower"), Ok(Outcome::Changed));

        let plan = tree.plan();
        assert_eq!(plan.routines.len(), 2);
        assert_eq!(plan.routines[1].name, "Lower");
        assert!(plan.routines[1].sections.is_empty());
        assert_ne!(plan.routines[0].id, plan.routines[1].id);
    }

    #[test]
    fn test_add_routine_rejects_duplicate_and_empty() {
        let mut tree = PlanTree::default();
        tree.add_routine("Upper").unwrap();
        tree.add_routine("Lower").unwrap();
        let before = tree.clone();

        assert_eq!(
            tree.add_routine("Upper"),
            Err(PlanError::DuplicateRoutine("Upper".to_string()))
        );
        assert_eq!(tree.add_routine("   "), Err(PlanError::EmptyField("routine name")));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_remove_routine() {
        let (mut tree, id) = create_tree(&[]);
        assert_eq!(tree.remove_routine("nope"), Outcome::Unchanged);
        assert_eq!(tree.remove_routine(&id), Outcome::Changed);
        assert!(tree.plan().is_empty());
    }

    #[test]
    fn test_add_section() {
        let (mut tree, id) = create_tree(&["Warm-up"]);
        assert_eq!(
            tree.add_section(&id, "Warm-up"),
            Err(PlanError::DuplicateSection("Warm-up".to_string()))
        );
        assert_eq!(
            tree.add_section("missing", "Legs"),
            Err(PlanError::RoutineNotFound("missing".to_string()))
        );
        tree.add_section(&id, "Legs").unwrap();
        assert_eq!(titles(&tree, &id), vec!["Warm-up", "Legs"]);
    }

    #[test]
    fn test_remove_section() {
        let (mut tree, id) = create_tree(&["A", "B", "C"]);
        assert_eq!(tree.remove_section(&id, "B"), Outcome::Changed);
        assert_eq!(tree.remove_section(&id, "B"), Outcome::Unchanged);
        assert_eq!(titles(&tree, &id), vec!["A", "C"]);
    }

    #[test]
    fn test_move_section_swaps_neighbours() {
        let (mut tree, id) = create_tree(&["A", "B", "C"]);
        assert_eq!(tree.move_section(&id, "C", Direction::Up), Outcome::Changed);
        assert_eq!(titles(&tree, &id), vec!["A", "C", "B"]);
        assert_eq!(tree.move_section(&id, "A", Direction::Down), Outcome::Changed);
        assert_eq!(titles(&tree, &id), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_move_section_at_edges_is_noop() {
        let (mut tree, id) = create_tree(&["A", "B", "C"]);
        assert_eq!(tree.move_section(&id, "A", Direction::Up), Outcome::Unchanged);
        assert_eq!(tree.move_section(&id, "C", Direction::Down), Outcome::Unchanged);
        assert_eq!(tree.move_section(&id, "Z", Direction::Down), Outcome::Unchanged);
        assert_eq!(titles(&tree, &id), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_move_up_then_down_restores_order() {
        let (mut tree, id) = create_tree(&["A", "B", "C", "D"]);
        let original = titles(&tree, &id);
        for title in ["B", "C"] {
            tree.move_section(&id, title, Direction::Up);
            tree.move_section(&id, title, Direction::Down);
            assert_eq!(titles(&tree, &id), original);
        }
    }

    #[test]
    fn test_add_exercise() {
        let (mut tree, id) = create_tree(&["Legs"]);
        let before = tree.clone();
        assert_eq!(
            tree.add_exercise(&id, "Legs", Exercise::new("  ", "3x10")),
            Err(PlanError::EmptyField("exercise name"))
        );
        assert_eq!(
            tree.add_exercise(&id, "Arms", Exercise::new("Curl", "3x10")),
            Err(PlanError::SectionNotFound("Arms".to_string()))
        );
        assert_eq!(tree, before);

        tree.add_exercise(&id, "Legs", Exercise::new("Squat", "")).unwrap();
        let exercise = &tree.plan().routines[0].sections[0].exercises[0];
        assert_eq!(exercise.name, "Squat");
        assert_eq!(exercise.details, DETAILS_TBD);
    }

    #[test]
    fn test_remove_exercise_shifts_indices() {
        let (mut tree, id) = create_tree(&["Legs"]);
        for name in ["Squat", "Lunge", "Deadlift"] {
            tree.add_exercise(&id, "Legs", Exercise::new(name, "3x10")).unwrap();
        }

        assert_eq!(tree.remove_exercise(&id, "Legs", 0), Outcome::Changed);
        let names: Vec<_> = tree.plan().routines[0].sections[0]
            .exercises
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Lunge", "Deadlift"]);

        assert_eq!(tree.remove_exercise(&id, "Legs", 2), Outcome::Unchanged);
        assert_eq!(tree.plan().exercise_count(), 2);
    }

    #[test]
    fn test_section_titles_are_trimmed_everywhere() {
        let (mut tree, id) = create_tree(&[" Legs ", "Arms"]);
        assert_eq!(titles(&tree, &id), vec!["Legs", "Arms"]);

        tree.add_exercise(&id, " Legs ", Exercise::new("Squat", "3x10")).unwrap();
        assert_eq!(tree.move_section(&id, " Arms ", Direction::Up), Outcome::Changed);
        assert_eq!(titles(&tree, &id), vec!["Arms", "Legs"]);
        assert_eq!(tree.remove_exercise(&id, " Legs ", 0), Outcome::Changed);
        assert_eq!(tree.remove_section(&id, " Legs "), Outcome::Changed);
        assert_eq!(titles(&tree, &id), vec!["Arms"]);
    }

    #[test]
    fn test_apply_import_is_all_or_nothing() {
        let (mut tree, _) = create_tree(&[]);
        let before = tree.clone();

        let mut imported = PlanTree::default();
        imported.add_routine("B").unwrap();
        imported.add_routine("A").unwrap();
        assert_eq!(
            tree.apply_import(imported.into_plan()),
            Err(ImportError::Conflict("A".to_string()))
        );
        assert_eq!(tree.apply_import(Plan::default()), Err(ImportError::Empty));
        assert_eq!(tree, before);

        let mut imported = PlanTree::default();
        imported.add_routine("B").unwrap();
        assert_eq!(tree.apply_import(imported.into_plan()), Ok(Outcome::Changed));
        assert_eq!(tree.plan().routines.len(), 2);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("UP".parse::<Direction>(), Ok(Direction::Up));
        assert_eq!("down".parse::<Direction>(), Ok(Direction::Down));
        assert!("left".parse::<Direction>().is_err());
    }
}
