//! fichario - workout plans shared between personal trainers and their students

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fichario::db::Database;
use fichario::error::{PlanError, SessionError};
use fichario::identity::{IdentityProvider, Principal, StaticIdentity, link_to_trainer, register_trainer};
use fichario::plan::video::embed_url;
use fichario::plan::{Direction, Exercise, Outcome, Plan};
use fichario::store::ProfileStore;
use fichario::sync::{SyncController, SyncState, View};
use fichario::tui::{App, TuiView};

#[derive(Parser)]
#[command(name = "fichario")]
#[command(author, version, about = "Workout plans shared between personal trainers and their students")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "FICHARIO_DB", default_value = "fichario.db")]
    db: String,

    /// Signed-in user id (a trainer's id is their trainer code)
    #[arg(short, long, global = true, env = "FICHARIO_USER")]
    user: Option<String>,

    /// Display name for the signed-in user
    #[arg(long, global = true, env = "FICHARIO_NAME")]
    name: Option<String>,

    /// Student whose plan to open (trainers only)
    #[arg(short, long, global = true, env = "FICHARIO_STUDENT")]
    student: Option<String>,

    /// How often watchers check for changes from other sessions
    #[arg(long, global = true, env = "FICHARIO_REFRESH_MS", default_value = "1000")]
    refresh_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register as a personal trainer
    Trainer,

    /// Link yourself as a student of a trainer
    Link {
        /// The trainer's code
        code: String,
    },

    /// Show who is signed in
    Whoami,

    /// List your students (trainers)
    Students,

    /// Print the plan
    Show,

    /// Add a routine ("ficha")
    AddRoutine { name: String },

    /// Remove a routine
    RmRoutine {
        /// Routine id or name
        routine: String,
        /// Confirm removal
        #[arg(long)]
        yes: bool,
    },

    /// Add a section to a routine
    AddSection { routine: String, title: String },

    /// Remove a section
    RmSection {
        routine: String,
        title: String,
        /// Confirm removal
        #[arg(long)]
        yes: bool,
    },

    /// Move a section up or down
    MoveSection {
        routine: String,
        title: String,
        /// up or down
        direction: Direction,
    },

    /// Add an exercise to a section
    AddExercise {
        routine: String,
        section: String,
        name: String,
        /// Sets and reps, e.g. "3x10"
        #[arg(short, long, default_value = "")]
        details: String,
        /// YouTube link
        #[arg(short, long, default_value = "")]
        video: String,
    },

    /// Remove an exercise by its number in the section (as printed by `show`)
    RmExercise {
        routine: String,
        section: String,
        number: usize,
    },

    /// Import routines from text ("-" reads stdin)
    Import {
        file: String,
        /// Put everything into one new routine with this name
        #[arg(short, long)]
        routine: Option<String>,
    },

    /// Follow the plan live
    Watch {
        /// Print each update instead of opening the TUI
        #[arg(long)]
        plain: bool,
    },

    /// Print the embeddable player URL for a video link
    Video { url: String },
}

/// Remembers that something needs printing; notifications go to stderr
#[derive(Debug, Default)]
struct ConsoleView {
    dirty: bool,
}

impl View for ConsoleView {
    fn render(&mut self, _plan: &Plan, _editable: bool) {
        self.dirty = true;
    }

    fn notify(&mut self, message: &str) {
        eprintln!("! {}", message);
    }
}

impl Cli {
    fn principal(&self) -> Option<Principal> {
        let id = self.user.as_deref()?.trim();
        if id.is_empty() {
            return None;
        }
        let name = self.name.clone().unwrap_or_else(|| id.to_string());
        Some(Principal::new(id, name))
    }

    fn require_principal(&self) -> Result<Principal> {
        self.principal()
            .context("not signed in: pass --user or set FICHARIO_USER")
    }
}

/// Sign in, open the plan and apply the first snapshot
fn connect<V: View>(cli: &Cli, view: V) -> Result<SyncController<Database, V>> {
    let db = Database::open(&cli.db)?;
    let identity = StaticIdentity::new(cli.principal());
    let mut controller = SyncController::new(db, view);

    match controller.on_principal_change(identity.current_principal())? {
        SyncState::Unauthenticated => bail!(SessionError::NotSignedIn),
        SyncState::Unregistered => bail!(SessionError::Unregistered),
        _ => {}
    }
    if let Some(student) = &cli.student {
        controller.select_subject(Some(student))?;
    }
    controller.pump();

    if controller.state() == SyncState::Unsubscribed {
        bail!("choose a student with --student (see `fichario students`)");
    }
    Ok(controller)
}

fn routine_id<V: View>(controller: &SyncController<Database, V>, key: &str) -> Result<String> {
    let plan = controller.plan().ok_or(PlanError::NotLoaded)?;
    let routine = plan
        .find_routine(key)
        .ok_or_else(|| PlanError::RoutineNotFound(key.to_string()))?;
    Ok(routine.id.clone())
}

fn print_plan(plan: &Plan, editable: bool) {
    if plan.is_empty() {
        println!("(no routines yet)");
        return;
    }
    for routine in &plan.routines {
        if editable {
            println!("{}  [{}]", routine.name, routine.id);
        } else {
            println!("{}", routine.name);
        }
        println!("{:=<60}", "");
        for section in &routine.sections {
            println!("  # {}", section.title);
            for (i, exercise) in section.exercises.iter().enumerate() {
                let video = embed_url(&exercise.video_url)
                    .map(|url| format!(" | {}", url))
                    .unwrap_or_default();
                println!("    {}. {:30} | {}{}", i + 1, exercise.name, exercise.details, video);
            }
        }
        println!();
    }
}

fn print_current<V: View>(controller: &SyncController<Database, V>) {
    if controller.access_mismatch() {
        println!("(this plan belongs to another trainer)");
    }
    if let Some(plan) = controller.plan() {
        print_plan(plan, controller.is_editable());
    }
}

fn report(outcome: Outcome, controller: &SyncController<Database, ConsoleView>) {
    match outcome {
        Outcome::Changed => print_current(controller),
        Outcome::Unchanged => println!("Nothing to change."),
    }
}

fn read_text(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("reading {}", file))
}

enum Tick {
    Snapshot,
    Refresh,
    Quit,
}

async fn watch_plain(cli: &Cli) -> Result<()> {
    let mut controller = connect(cli, ConsoleView::default())?;
    let refresh = Duration::from_millis(cli.refresh_ms);
    print_current(&controller);
    controller.view_mut().dirty = false;

    loop {
        let tick = tokio::select! {
            _ = tokio::signal::ctrl_c() => Tick::Quit,
            applied = controller.next_snapshot() => {
                applied?;
                Tick::Snapshot
            }
            _ = tokio::time::sleep(refresh) => Tick::Refresh,
        };
        match tick {
            Tick::Quit => break,
            Tick::Refresh => {
                controller.store().refresh()?;
            }
            Tick::Snapshot => {
                if std::mem::take(&mut controller.view_mut().dirty) {
                    println!("--- {}", chrono::Local::now().format("%H:%M:%S"));
                    print_current(&controller);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Watch { plain: false } => "fichario=warn",
        _ => "fichario=info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Trainer => {
            let principal = cli.require_principal()?;
            let db = Database::open(&cli.db)?;
            register_trainer(&db, &principal)?;
            println!("Registered {} as a trainer.", principal.display_name);
            println!("Your trainer code: {}", principal.id);
        }

        Commands::Link { code } => {
            let principal = cli.require_principal()?;
            let db = Database::open(&cli.db)?;
            link_to_trainer(&db, &principal, code)?;
            println!("Linked to trainer {}.", code.trim());
        }

        Commands::Whoami => {
            let db = Database::open(&cli.db)?;
            let mut controller = SyncController::new(db, ConsoleView::default());
            let state = controller.on_principal_change(cli.principal())?;
            match controller.session() {
                Some(session) => println!(
                    "{} ({}) - {:?}",
                    session.principal().display_name,
                    session.principal().id,
                    session.access()
                ),
                None => println!("Not signed in"),
            }
            println!("State: {:?}", state);
        }

        Commands::Students => {
            let principal = cli.require_principal()?;
            let db = Database::open(&cli.db)?;
            let students = db.students(&principal.id)?;
            println!("Students:");
            println!("{:-<40}", "");
            for s in &students {
                println!("{:20} | {}", s.student_id, s.name);
            }
            if students.is_empty() {
                println!("(none - share your code: {})", principal.id);
            }
        }

        Commands::Show => {
            let controller = connect(&cli, ConsoleView::default())?;
            print_current(&controller);
        }

        Commands::AddRoutine { name } => {
            let mut controller = connect(&cli, ConsoleView::default())?;
            let outcome = controller.edit(|t| t.add_routine(name))?;
            report(outcome, &controller);
        }

        Commands::RmRoutine { routine, yes } => {
            if !yes {
                bail!("removing routine \"{}\" needs --yes", routine);
            }
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let outcome = controller.edit(|t| Ok(t.remove_routine(&id)))?;
            report(outcome, &controller);
        }

        Commands::AddSection { routine, title } => {
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let outcome = controller.edit(|t| t.add_section(&id, title))?;
            report(outcome, &controller);
        }

        Commands::RmSection { routine, title, yes } => {
            if !yes {
                bail!("removing section \"{}\" needs --yes", title);
            }
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let outcome = controller.edit(|t| Ok(t.remove_section(&id, title)))?;
            report(outcome, &controller);
        }

        Commands::MoveSection { routine, title, direction } => {
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let outcome = controller.edit(|t| Ok(t.move_section(&id, title, *direction)))?;
            report(outcome, &controller);
        }

        Commands::AddExercise { routine, section, name, details, video } => {
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let exercise = Exercise::new(name.as_str(), details.as_str()).with_video(video.as_str());
            let outcome = controller.edit(|t| t.add_exercise(&id, section, exercise))?;
            report(outcome, &controller);
        }

        Commands::RmExercise { routine, section, number } => {
            let Some(index) = number.checked_sub(1) else {
                bail!("exercise numbers start at 1");
            };
            let mut controller = connect(&cli, ConsoleView::default())?;
            let id = routine_id(&controller, routine)?;
            let outcome = controller.edit(|t| Ok(t.remove_exercise(&id, section, index)))?;
            report(outcome, &controller);
        }

        Commands::Import { file, routine } => {
            let text = read_text(file)?;
            let mut controller = connect(&cli, ConsoleView::default())?;
            let outcome = controller.import(&text, routine.as_deref())?;
            report(outcome, &controller);
        }

        Commands::Watch { plain: true } => {
            watch_plain(&cli).await?;
        }

        Commands::Watch { plain: false } => {
            let controller = connect(&cli, TuiView::default())?;
            let mut app = App::new(controller, Duration::from_millis(cli.refresh_ms));
            app.run()?;
        }

        Commands::Video { url } => match embed_url(url) {
            Some(embed) => println!("{}", embed),
            None => println!("No embeddable video in {}", url),
        },
    }

    Ok(())
}
