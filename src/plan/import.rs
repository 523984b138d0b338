//! Bulk import - turn pasted free text into a plan
//!
//! ```text
//! ## Treino A          <- routine
//! # Pernas             <- section
//! Agachamento 3x10     <- exercise, "3x10" becomes the details
//! https://youtu.be/x   <- video for the exercise above
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::tree::new_routine_id;
use super::video::is_video_link;
use super::{DETAILS_TBD, Exercise, Plan, Routine, Section};
use crate::error::ImportError;

pub const ROUTINE_MARKER: &str = "## ";
pub const SECTION_MARKER: &str = "# ";

/// Where exercises go when no section heading came first
pub const DEFAULT_SECTION: &str = "Exercícios Diversos";

/// "<name> <sets>x<reps>" with an optional rep range and an optional dash separator
static EXERCISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)(?:\s*[-–]\s*|\s+)(\d+\s*[xX]\s*\d+(?:-\d+)?)$").expect("valid exercise regex")
});

/// Heading text after `marker`, or `None` if the line is not that heading.
/// A bare marker yields an empty name.
fn heading<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    if line == marker.trim_end() {
        return Some("");
    }
    line.strip_prefix(marker).map(str::trim)
}

/// Split an exercise line into name and set/rep details
pub fn parse_exercise_line(line: &str) -> Exercise {
    match EXERCISE_RE.captures(line) {
        Some(caps) => Exercise::new(caps[1].trim(), caps[2].trim()),
        None => Exercise::new(line, DETAILS_TBD),
    }
}

/// Line-oriented plan parser
#[derive(Debug, Clone, Default)]
pub struct Importer {
    routine: Option<String>,
}

impl Importer {
    /// Multi-routine import: every routine needs its own `## ` heading
    pub fn new() -> Self {
        Self::default()
    }

    /// Import into one routine named `name`, open from the first line
    pub fn for_routine(name: impl Into<String>) -> Self {
        Self {
            routine: Some(name.into()),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Plan, ImportError> {
        let mut builder = Builder::default();
        if let Some(name) = &self.routine {
            builder.open_routine(name.trim());
        }

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(name) = heading(line, ROUTINE_MARKER) {
                builder.open_routine_heading(name);
            } else if let Some(title) = heading(line, SECTION_MARKER) {
                builder.open_section(title);
            } else if is_video_link(line) {
                builder.attach_video(line);
            } else {
                builder.push_exercise(parse_exercise_line(line));
            }
        }

        let mut routines = builder.routines;
        if self.routine.is_some() {
            // the implicit routine only counts if something landed in it
            routines.retain(|r| builder.explicit.contains(&r.id) || !r.sections.is_empty());
        }
        if routines.is_empty() {
            return Err(ImportError::Empty);
        }

        let plan = Plan { routines };
        info!(
            "Imported {} routine(s), {} exercise(s)",
            plan.routines.len(),
            plan.exercise_count()
        );
        Ok(plan)
    }
}

/// Parse with the multi-routine grammar
pub fn parse(text: &str) -> Result<Plan, ImportError> {
    Importer::new().parse(text)
}

#[derive(Default)]
struct Builder {
    routines: Vec<Routine>,
    /// ids of routines opened by a heading
    explicit: Vec<String>,
    routine: Option<usize>,
    section: Option<usize>,
}

impl Builder {
    fn open_routine(&mut self, name: &str) {
        if name.is_empty() {
            debug!("Skipping routine heading without a name");
            return;
        }
        let index = match self.routines.iter().position(|r| r.name == name) {
            Some(index) => index,
            None => {
                let id = new_routine_id(&self.routines);
                self.routines.push(Routine {
                    id,
                    name: name.to_string(),
                    sections: Vec::new(),
                });
                self.routines.len() - 1
            }
        };
        self.routine = Some(index);
        self.section = None;
    }

    fn open_routine_heading(&mut self, name: &str) {
        self.open_routine(name);
        if let Some(index) = self.routine {
            let id = self.routines[index].id.clone();
            if !self.explicit.contains(&id) {
                self.explicit.push(id);
            }
        }
    }

    fn open_section(&mut self, title: &str) {
        if title.is_empty() {
            debug!("Skipping section heading without a title");
            return;
        }
        let Some(routine) = self.routine.map(|i| &mut self.routines[i]) else {
            debug!("Dropping section {} outside any routine", title);
            return;
        };
        let index = match routine.sections.iter().position(|s| s.title == title) {
            Some(index) => index,
            None => {
                routine.sections.push(Section::new(title));
                routine.sections.len() - 1
            }
        };
        self.section = Some(index);
    }

    fn current_section(&mut self) -> Option<&mut Section> {
        let routine = &mut self.routines[self.routine?];
        routine.sections.get_mut(self.section?)
    }

    fn push_exercise(&mut self, exercise: Exercise) {
        if self.routine.is_none() {
            debug!("Dropping exercise {} outside any routine", exercise.name);
            return;
        }
        if self.section.is_none() {
            self.open_section(DEFAULT_SECTION);
        }
        if let Some(section) = self.current_section() {
            section.exercises.push(exercise);
        }
    }

    fn attach_video(&mut self, url: &str) {
        match self.current_section().and_then(|s| s.exercises.last_mut()) {
            Some(exercise) => exercise.video_url = url.to_string(),
            None => debug!("Dropping video link with no exercise before it: {}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_routine_section_exercises() {
        let text = "## Routine A\n# Legs\nSquat 3x10\nhttps://youtu.be/abc123\nLunge 8-12\n";
        let plan = parse(text).unwrap();

        assert_eq!(plan.routines.len(), 1);
        let routine = &plan.routines[0];
        assert_eq!(routine.name, "Routine A");
        assert_eq!(routine.sections.len(), 1);

        let section = &routine.sections[0];
        assert_eq!(section.title, "Legs");
        assert_eq!(
            section.exercises,
            vec![
                Exercise::new("Squat", "3x10").with_video("https://youtu.be/abc123"),
                Exercise::new("Lunge 8-12", DETAILS_TBD),
            ]
        );
    }

    #[test]
    fn test_exercise_line_grammar() {
        assert_eq!(parse_exercise_line("Supino reto - 4x8-12"), Exercise::new("Supino reto", "4x8-12"));
        assert_eq!(parse_exercise_line("Remada – 3 X 10"), Exercise::new("Remada", "3 X 10"));
        assert_eq!(parse_exercise_line("Prancha"), Exercise::new("Prancha", DETAILS_TBD));
        assert_eq!(parse_exercise_line("3x10"), Exercise::new("3x10", DETAILS_TBD));
    }

    #[test]
    fn test_empty_or_headingless_text_is_rejected() {
        assert_eq!(parse(""), Err(ImportError::Empty));
        assert_eq!(parse("   \n\n"), Err(ImportError::Empty));
        assert_eq!(parse("# Legs\nSquat 3x10\n"), Err(ImportError::Empty));
        assert_eq!(parse("Squat 3x10\nhttps://youtu.be/abc"), Err(ImportError::Empty));
    }

    #[test]
    fn test_exercises_without_section_go_to_default() {
        let plan = parse("## A\nSquat 3x10\n# Arms\nCurl 3x12").unwrap();
        let titles: Vec<_> = plan.routines[0].sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec![DEFAULT_SECTION, "Arms"]);
    }

    #[test]
    fn test_video_before_any_exercise_is_dropped() {
        let plan = parse("## A\n# Legs\nwww.youtube.com/watch?v=abc\nSquat 3x10").unwrap();
        let exercises = &plan.routines[0].sections[0].exercises;
        assert_eq!(exercises.len(), 1);
        assert!(!exercises[0].has_video());
    }

    #[test]
    fn test_video_only_attaches_within_current_section() {
        let plan = parse("## A\n# Legs\nSquat 3x10\n# Arms\nhttps://m.youtube.com/shorts/xyz").unwrap();
        let routine = &plan.routines[0];
        assert!(!routine.sections[0].exercises[0].has_video());
        assert!(routine.sections[1].exercises.is_empty());
    }

    #[test]
    fn test_repeated_headings_reopen() {
        let plan = parse("## A\n# Legs\nSquat 3x10\n## B\n# Back\nRow 3x10\n## A\n# Legs\nLunge 3x8").unwrap();
        assert_eq!(plan.routines.len(), 2);
        let legs = &plan.routines[0].sections;
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].exercises.len(), 2);
    }

    #[test]
    fn test_for_routine() {
        let plan = Importer::for_routine("Treino A")
            .parse("Squat 3x10\n# Arms\nCurl 3x12")
            .unwrap();
        assert_eq!(plan.routines.len(), 1);
        assert_eq!(plan.routines[0].name, "Treino A");
        assert_eq!(plan.routines[0].sections.len(), 2);

        assert_eq!(Importer::for_routine("Treino A").parse(""), Err(ImportError::Empty));
    }

    #[test]
    fn test_ids_are_fresh_per_parse() {
        let text = "## A\n# Legs\nSquat 3x10\n## B";
        let first = parse(text).unwrap();
        let second = parse(text).unwrap();

        assert_ne!(first.routines[0].id, first.routines[1].id);
        let shape = |plan: &Plan| -> Vec<(String, Vec<Section>)> {
            plan.routines.iter().map(|r| (r.name.clone(), r.sections.clone())).collect()
        };
        assert_eq!(shape(&first), shape(&second));
    }
}
