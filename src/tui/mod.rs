//! TUI module - live plan viewer with ratatui

use std::io::{Stdout, stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs},
};
use tracing::error;

use crate::db::Database;
use crate::plan::video::embed_url;
use crate::plan::{Direction, Exercise, Plan, Routine};
use crate::sync::{SyncController, View};

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Holds the last notification for the footer
#[derive(Debug, Default)]
pub struct TuiView {
    notice: Option<String>,
}

impl View for TuiView {
    fn render(&mut self, _plan: &Plan, _editable: bool) {
        // frames are redrawn every tick from the controller's plan
    }

    fn notify(&mut self, message: &str) {
        self.notice = Some(message.to_string());
    }
}

/// App state for TUI
pub struct App {
    controller: SyncController<Database, TuiView>,
    refresh: Duration,
    tab: usize,
    /// index into the current routine's exercises, counted across sections
    selected: usize,
    should_quit: bool,
}

/// (section index, exercise index) of every exercise in display order
fn exercise_slots(routine: &Routine) -> Vec<(usize, usize)> {
    routine
        .sections
        .iter()
        .enumerate()
        .flat_map(|(s, section)| (0..section.exercises.len()).map(move |e| (s, e)))
        .collect()
}

impl App {
    pub fn new(controller: SyncController<Database, TuiView>, refresh: Duration) -> Self {
        Self {
            controller,
            refresh,
            tab: 0,
            selected: 0,
            should_quit: false,
        }
    }

    /// Run the TUI application
    pub fn run(&mut self) -> Result<()> {
        let mut terminal = init_terminal()?;
        let mut last_refresh = Instant::now();

        while !self.should_quit {
            self.controller.pump();
            self.clamp_selection();
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;

            if last_refresh.elapsed() >= self.refresh {
                self.refresh();
                last_refresh = Instant::now();
            }
        }

        restore_terminal()?;
        Ok(())
    }

    fn refresh(&mut self) {
        if let Err(e) = self.controller.store().refresh() {
            error!("Refresh failed: {}", e);
            self.controller.view_mut().notify(&format!("Refresh failed: {}", e));
        }
    }

    fn routine(&self) -> Option<&Routine> {
        self.controller.plan()?.routines.get(self.tab)
    }

    fn selected_exercise(&self) -> Option<(&Routine, usize, &Exercise)> {
        let routine = self.routine()?;
        let (s, e) = *exercise_slots(routine).get(self.selected)?;
        Some((routine, s, &routine.sections[s].exercises[e]))
    }

    fn clamp_selection(&mut self) {
        let routines = self.controller.plan().map_or(0, |p| p.routines.len());
        self.tab = self.tab.min(routines.saturating_sub(1));
        let exercises = self.routine().map_or(0, |r| exercise_slots(r).len());
        self.selected = self.selected.min(exercises.saturating_sub(1));
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(layout::Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(3),
            ])
            .split(area);

        // Header: routine tabs
        let session = self.controller.session();
        let who = session.map(|s| s.principal().display_name.clone()).unwrap_or_default();
        let subject = session.and_then(|s| s.subject_id()).unwrap_or("-");
        let mode = if self.controller.is_editable() { "editing" } else { "viewing" };
        let names: Vec<String> = self
            .controller
            .plan()
            .map(|p| p.routines.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        let tabs = Tabs::new(names)
            .select(self.tab)
            .highlight_style(Style::default().fg(Color::Cyan).bold())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("fichario - {} ({}) - {}", who, mode, subject)),
            );
        frame.render_widget(tabs, chunks[0]);

        // Sections and exercises
        let mut items: Vec<ListItem> = Vec::new();
        let mut selected_row = None;
        match (self.controller.plan(), self.routine()) {
            (None, _) => items.push(ListItem::new("Loading plan...")),
            (Some(_), None) if self.controller.access_mismatch() => {
                items.push(ListItem::new("This plan belongs to another trainer."))
            }
            (Some(_), None) => items.push(ListItem::new("No routines yet.")),
            (Some(_), Some(routine)) => {
                let mut index = 0;
                for section in &routine.sections {
                    items.push(ListItem::new(section.title.clone()).style(Style::default().fg(Color::Yellow).bold()));
                    for exercise in &section.exercises {
                        if index == self.selected {
                            selected_row = Some(items.len());
                        }
                        let video = if exercise.has_video() { "  [video]" } else { "" };
                        items.push(ListItem::new(format!("  {} - {}{}", exercise.name, exercise.details, video)));
                        index += 1;
                    }
                }
            }
        }

        let list = List::new(items)
            .highlight_style(Style::default().bg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Exercises"));
        let mut state = ListState::default().with_selected(selected_row);
        frame.render_stateful_widget(list, chunks[1], &mut state);

        // Footer
        let help = if self.controller.is_editable() {
            "q: quit | ←/→: routine | ↑/↓: exercise | v: video | K/J: move section | r: refresh"
        } else {
            "q: quit | ←/→: routine | ↑/↓: exercise | v: video | r: refresh"
        };
        let footer = Paragraph::new(self.controller.view().notice.clone().unwrap_or_else(|| help.to_string()))
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(footer, chunks[2]);
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            self.controller.view_mut().notice = None;
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Char('r') => self.refresh(),
                KeyCode::Left => {
                    self.tab = self.tab.saturating_sub(1);
                    self.selected = 0;
                }
                KeyCode::Right => {
                    self.tab += 1;
                    self.selected = 0;
                }
                KeyCode::Up => self.selected = self.selected.saturating_sub(1),
                KeyCode::Down => self.selected += 1,
                KeyCode::Char('v') => self.show_video(),
                KeyCode::Char('K') => self.move_section(Direction::Up),
                KeyCode::Char('J') => self.move_section(Direction::Down),
                _ => {}
            }
        }
        Ok(())
    }

    fn show_video(&mut self) {
        let Some(url) = self.selected_exercise().and_then(|(_, _, e)| embed_url(&e.video_url)) else {
            return;
        };
        self.controller.view_mut().notify(&url);
    }

    fn move_section(&mut self, direction: Direction) {
        let Some((routine, s, _)) = self.selected_exercise() else {
            return;
        };
        let routine_id = routine.id.clone();
        let title = routine.sections[s].title.clone();
        if let Err(e) = self.controller.edit(|tree| Ok(tree.move_section(&routine_id, &title, direction))) {
            self.controller.view_mut().notify(&e.to_string());
        }
    }
}

fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Section;

    #[test]
    fn test_exercise_slots_skip_empty_sections() {
        let routine = Routine {
            id: "r".to_string(),
            name: "A".to_string(),
            sections: vec![
                Section {
                    title: "Warm-up".to_string(),
                    exercises: vec![Exercise::new("Jump rope", "5min")],
                },
                Section::new("Empty"),
                Section {
                    title: "Legs".to_string(),
                    exercises: vec![Exercise::new("Squat", "3x10"), Exercise::new("Lunge", "3x8")],
                },
            ],
        };
        assert_eq!(exercise_slots(&routine), vec![(0, 0), (2, 0), (2, 1)]);
    }
}
