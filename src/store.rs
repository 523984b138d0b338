//! Store interfaces - where plans and profiles live
//!
//! The sync controller only talks to these traits; `db::Database` is the
//! SQLite implementation.

use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

use crate::error::StoreError;
use crate::identity::{Profile, StudentLink};
use crate::plan::PlanDocument;

/// Point-in-time read of a subject's plan document
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub subject_id: String,
    /// `None` when the document does not exist
    pub document: Option<PlanDocument>,
}

/// Live listener on one subject's document.
///
/// Single owner: dropping it (or calling `unsubscribe`) stops delivery.
pub struct Subscription {
    subject_id: String,
    rx: UnboundedReceiver<Snapshot>,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(subject_id: impl Into<String>, rx: UnboundedReceiver<Snapshot>, cancel: impl FnOnce() + 'static) -> Self {
        Self {
            subject_id: subject_id.into(),
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Next pending snapshot without waiting
    pub fn try_next(&mut self) -> Result<Option<Snapshot>, StoreError> {
        match self.rx.try_recv() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(StoreError::Closed),
        }
    }

    /// Wait for the next snapshot
    pub async fn next(&mut self) -> Result<Snapshot, StoreError> {
        self.rx.recv().await.ok_or(StoreError::Closed)
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject_id", &self.subject_id)
            .finish_non_exhaustive()
    }
}

/// Per-subject plan documents
pub trait PlanStore {
    /// One-shot read
    fn get(&self, subject_id: &str) -> Result<Option<PlanDocument>, StoreError>;

    /// Live listener; the current state arrives as the first snapshot
    fn subscribe(&self, subject_id: &str) -> Result<Subscription, StoreError>;

    /// Write the document, merging into the stored one when `merge` is set
    fn upsert(&self, subject_id: &str, document: &PlanDocument, merge: bool) -> Result<(), StoreError>;
}

/// Profile records, the trainer directory and trainer → student links
pub trait ProfileStore {
    fn profile(&self, principal_id: &str) -> Result<Option<Profile>, StoreError>;

    fn put_profile(&self, principal_id: &str, profile: &Profile) -> Result<(), StoreError>;

    fn trainer_exists(&self, trainer_id: &str) -> Result<bool, StoreError>;

    fn put_trainer(&self, trainer_id: &str, display_name: &str) -> Result<(), StoreError>;

    fn link_student(&self, trainer_id: &str, student_id: &str, name: &str) -> Result<(), StoreError>;

    fn students(&self, trainer_id: &str) -> Result<Vec<StudentLink>, StoreError>;
}
