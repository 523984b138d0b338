//! Error types - validation, import, storage and session failures

use thiserror::Error;

/// Rejected edit on the plan tree. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("{0} is required")]
    EmptyField(&'static str),

    #[error("a routine named \"{0}\" already exists")]
    DuplicateRoutine(String),

    #[error("a section named \"{0}\" already exists in this routine")]
    DuplicateSection(String),

    #[error("routine not found: {0}")]
    RoutineNotFound(String),

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("this plan is read-only")]
    ReadOnly,

    #[error("no plan loaded")]
    NotLoaded,
}

/// Bulk text import rejected as a whole
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("nothing to import: the text has no routines")]
    Empty,

    #[error("a routine named \"{0}\" already exists")]
    Conflict(String),
}

/// Storage backend failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("subscription closed")]
    Closed,
}

/// Failures of the signed-in session (role resolution, onboarding, editing)
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,

    #[error("no profile yet: register as a trainer or link to one first")]
    Unregistered,

    #[error("only trainers can do that")]
    NotTrainer,

    #[error("invalid trainer code: {0}")]
    InvalidTrainerCode(String),

    #[error("{0} is not one of your students")]
    NotYourStudent(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
