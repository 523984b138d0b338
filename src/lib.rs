//! fichario - workout plans shared between personal trainers and their students
//!
//! A trainer ("personal") picks a student ("aluno") and edits their plan:
//! routines ("fichas") made of sections made of exercises. The student sees
//! the same plan, updated live.

pub mod db;
pub mod error;
pub mod identity;
pub mod plan;
pub mod store;
pub mod sync;
pub mod tui;

pub use db::Database;
pub use plan::{Plan, PlanTree};
pub use sync::SyncController;
