//! Sync module - keeps the local plan and the stored document in step
//!
//! One controller per signed-in user. It owns the session (who is signed in,
//! which student is open, the plan tree and the single live subscription),
//! applies incoming snapshots, and pushes the whole plan after every local edit.

use tracing::{debug, error, info, warn};

use crate::error::{PlanError, SessionError, StoreError};
use crate::identity::{Access, Principal, resolve_access};
use crate::plan::{Importer, Outcome, Plan, PlanDocument, PlanTree};
use crate::store::{PlanStore, ProfileStore, Snapshot, Subscription};

/// Rendering hook
pub trait View {
    /// Draw the plan; `editable` is false for students and read-only sessions
    fn render(&mut self, plan: &Plan, editable: bool);

    /// Non-blocking message for the user (failed save, lost connection, ...)
    fn notify(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nobody signed in
    Unauthenticated,
    /// Signed in, no profile yet
    Unregistered,
    /// Trainer with no student selected
    Unsubscribed,
    /// Waiting for the first snapshot
    Subscribed,
    /// Plan available
    Loaded,
}

/// Signed-in user's working state
#[derive(Debug)]
pub struct Session {
    principal: Principal,
    access: Option<Access>,
    subject_id: Option<String>,
    /// trainer id a snapshot must carry to be accepted
    expected_trainer: Option<String>,
    tree: Option<PlanTree>,
    access_mismatch: bool,
    subscription: Option<Subscription>,
}

impl Session {
    fn new(principal: Principal, access: Option<Access>) -> Self {
        Self {
            principal,
            access,
            subject_id: None,
            expected_trainer: None,
            tree: None,
            access_mismatch: false,
            subscription: None,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn access(&self) -> Option<&Access> {
        self.access.as_ref()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    fn is_trainer(&self) -> bool {
        matches!(self.access, Some(Access::Trainer { .. }))
    }

    fn editable(&self) -> bool {
        self.is_trainer() && self.subject_id.is_some() && self.tree.is_some() && !self.access_mismatch
    }

    /// Drop the current listener and plan
    fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!("Closing subscription on {}", subscription.subject_id());
            subscription.unsubscribe();
        }
        self.subject_id = None;
        self.expected_trainer = None;
        self.tree = None;
        self.access_mismatch = false;
    }
}

/// Synchronization controller
pub struct SyncController<S, V> {
    store: S,
    view: V,
    session: Option<Session>,
}

impl<S, V> SyncController<S, V>
where
    S: PlanStore + ProfileStore,
    V: View,
{
    pub fn new(store: S, view: V) -> Self {
        Self {
            store,
            view,
            session: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> SyncState {
        match &self.session {
            None => SyncState::Unauthenticated,
            Some(session) if session.access.is_none() => SyncState::Unregistered,
            Some(session) if session.tree.is_some() => SyncState::Loaded,
            Some(session) if session.subscription.is_some() => SyncState::Subscribed,
            Some(_) => SyncState::Unsubscribed,
        }
    }

    /// Loaded plan, `None` until the first snapshot arrives
    pub fn plan(&self) -> Option<&Plan> {
        self.session.as_ref()?.tree.as_ref().map(PlanTree::plan)
    }

    pub fn is_editable(&self) -> bool {
        self.session.as_ref().is_some_and(Session::editable)
    }

    /// True when the last snapshot belonged to a different trainer
    pub fn access_mismatch(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.access_mismatch)
    }

    /// Auth state changed: sign the new principal in, or sign out on `None`
    pub fn on_principal_change(&mut self, principal: Option<Principal>) -> Result<SyncState, SessionError> {
        self.sign_out();
        let Some(principal) = principal else {
            return Ok(self.state());
        };

        let access = resolve_access(&self.store, &principal)?;
        info!("Signed in as {} ({:?})", principal.id, access);
        let client = match &access {
            Some(Access::Client { student_id, trainer_id }) => Some((student_id.clone(), trainer_id.clone())),
            _ => None,
        };
        self.session = Some(Session::new(principal, access));

        if let Some((student_id, trainer_id)) = client {
            self.open(student_id, trainer_id)?;
        }
        Ok(self.state())
    }

    /// Clear all local state and stop listening
    pub fn sign_out(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("Signed out {}", session.principal.id);
        }
    }

    /// Trainer opens a student's plan (or closes it with `None`)
    pub fn select_subject(&mut self, student_id: Option<&str>) -> Result<SyncState, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NotSignedIn)?;
        let trainer_id = match &session.access {
            Some(Access::Trainer { trainer_id }) => trainer_id.clone(),
            Some(Access::Client { .. }) => return Err(SessionError::NotTrainer),
            None => return Err(SessionError::Unregistered),
        };

        session.close();
        let Some(student_id) = student_id else {
            return Ok(self.state());
        };

        let linked = self.store.students(&trainer_id)?;
        if !linked.iter().any(|s| s.student_id == student_id) {
            return Err(SessionError::NotYourStudent(student_id.to_string()));
        }
        self.open(student_id.to_string(), trainer_id)?;
        Ok(self.state())
    }

    /// Start listening on `subject_id`, replacing any previous listener
    fn open(&mut self, subject_id: String, expected_trainer: String) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NotSignedIn)?;
        session.close();

        let subscription = match self.store.subscribe(&subject_id) {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Failed to watch plan of {}: {}", subject_id, e);
                self.view.notify(&format!("Could not open the plan: {}", e));
                return Err(e.into());
            }
        };
        info!("Watching plan of {}", subject_id);
        session.subject_id = Some(subject_id);
        session.expected_trainer = Some(expected_trainer);
        session.subscription = Some(subscription);
        Ok(())
    }

    /// Apply every snapshot already delivered, without waiting.
    /// Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(subscription) = self.session.as_mut().and_then(|s| s.subscription.as_mut()) else {
                return applied;
            };
            match subscription.try_next() {
                Ok(Some(snapshot)) => {
                    if self.apply_snapshot(snapshot) {
                        applied += 1;
                    }
                }
                Ok(None) => return applied,
                Err(e) => {
                    self.subscription_lost(e);
                    return applied;
                }
            }
        }
    }

    /// Wait for the next snapshot and apply it
    pub async fn next_snapshot(&mut self) -> Result<bool, SessionError> {
        let subscription = self
            .session
            .as_mut()
            .and_then(|s| s.subscription.as_mut())
            .ok_or(StoreError::Closed)?;
        match subscription.next().await {
            Ok(snapshot) => Ok(self.apply_snapshot(snapshot)),
            Err(e) => {
                self.subscription_lost(e);
                Err(StoreError::Closed.into())
            }
        }
    }

    fn subscription_lost(&mut self, e: StoreError) {
        error!("Plan subscription failed: {}", e);
        if let Some(session) = self.session.as_mut() {
            session.subscription = None;
        }
        self.view.notify("Lost connection to the plan; showing the last loaded version");
    }

    /// Replace the local plan with `snapshot` if it belongs to the open subject.
    /// A document written by another trainer loads as an empty, read-only plan.
    fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.subject_id.as_deref() != Some(snapshot.subject_id.as_str()) {
            debug!("Ignoring stale snapshot for {}", snapshot.subject_id);
            return false;
        }

        let (plan, mismatch) = match snapshot.document {
            None => (Plan::default(), false),
            Some(doc) if Some(doc.trainer_id.as_str()) == session.expected_trainer.as_deref() => (doc.plan, false),
            Some(doc) => {
                warn!(
                    "Plan of {} belongs to trainer {}, not {:?}; showing it empty",
                    snapshot.subject_id, doc.trainer_id, session.expected_trainer
                );
                (Plan::default(), true)
            }
        };
        debug!("Loaded plan of {} ({} routines)", snapshot.subject_id, plan.routines.len());
        session.tree = Some(PlanTree::new(plan));
        session.access_mismatch = mismatch;
        self.render();
        true
    }

    fn render(&mut self) {
        let editable = self.is_editable();
        if let Some(tree) = self.session.as_ref().and_then(|s| s.tree.as_ref()) {
            self.view.render(tree.plan(), editable);
        }
    }

    fn editable_tree(&mut self) -> Result<&mut PlanTree, PlanError> {
        let session = self.session.as_mut().ok_or(PlanError::NotLoaded)?;
        if !session.editable() {
            return Err(match session.tree {
                None if session.is_trainer() => PlanError::NotLoaded,
                _ => PlanError::ReadOnly,
            });
        }
        session.tree.as_mut().ok_or(PlanError::NotLoaded)
    }

    /// Run one edit on the plan tree. A change re-renders and is pushed.
    pub fn edit<F>(&mut self, f: F) -> Result<Outcome, SessionError>
    where
        F: FnOnce(&mut PlanTree) -> Result<Outcome, PlanError>,
    {
        let outcome = f(self.editable_tree()?)?;
        if outcome.is_changed() {
            self.render();
            self.push();
        }
        Ok(outcome)
    }

    /// Parse `text` and append its routines. With `routine_name`, the whole
    /// text goes into one new routine of that name.
    pub fn import(&mut self, text: &str, routine_name: Option<&str>) -> Result<Outcome, SessionError> {
        let tree = self.editable_tree()?;
        let importer = match routine_name {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(PlanError::EmptyField("routine name").into());
                }
                if tree.plan().routine_by_name(name).is_some() {
                    return Err(PlanError::DuplicateRoutine(name.to_string()).into());
                }
                Importer::for_routine(name)
            }
            None => Importer::new(),
        };

        let imported = importer.parse(text)?;
        let outcome = tree.apply_import(imported)?;
        self.render();
        self.push();
        Ok(outcome)
    }

    /// Write the whole plan back. Failures are logged and shown, never returned.
    fn push(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let (Some(subject_id), Some(tree)) = (session.subject_id.as_deref(), session.tree.as_ref()) else {
            return;
        };
        let document = PlanDocument::new(tree.plan().clone(), session.principal.id.clone());

        match self.store.upsert(subject_id, &document, true) {
            Ok(()) => debug!("Pushed plan of {}", subject_id),
            Err(e) => {
                error!("Failed to save plan of {}: {}", subject_id, e);
                self.view.notify(&format!("Could not save the plan: {}", e));
            }
        }
    }
}
