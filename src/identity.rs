//! Identity module - who is signed in, their role, and onboarding
//!
//! Trainers ("personal") edit plans for the students linked to them.
//! Students ("aluno") only see their own plan. A trainer's principal id is the
//! code students type to link themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PlanError, SessionError};
use crate::plan::{Plan, PlanDocument};
use crate::store::{PlanStore, ProfileStore};

/// Signed-in user as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "personal")]
    Trainer,
    #[serde(rename = "aluno")]
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainer => "personal",
            Role::Client => "aluno",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" | "trainer" => Ok(Role::Trainer),
            "aluno" | "client" | "student" => Ok(Role::Client),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Profile record keyed by principal id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub role: Role,
    pub display_name: String,
    /// Set for students: the trainer they are bound to
    pub trainer_id: Option<String>,
}

/// Entry in a trainer's student list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentLink {
    pub student_id: String,
    pub name: String,
}

/// Authentication provider
pub trait IdentityProvider {
    fn current_principal(&self) -> Option<Principal>;
}

/// Identity fixed at startup (from the command line or environment)
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    principal: Option<Principal>,
}

impl StaticIdentity {
    pub fn new(principal: Option<Principal>) -> Self {
        Self { principal }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}

/// What a registered principal is allowed to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Edits the plans of linked students
    Trainer { trainer_id: String },
    /// Views their own plan, written by `trainer_id`
    Client { student_id: String, trainer_id: String },
}

/// Resolve role and trainer binding; `None` for a principal with no profile yet
pub fn resolve_access<S: ProfileStore>(store: &S, principal: &Principal) -> Result<Option<Access>, SessionError> {
    let Some(profile) = store.profile(&principal.id)? else {
        return Ok(None);
    };
    let access = match profile.role {
        Role::Trainer => Access::Trainer {
            trainer_id: principal.id.clone(),
        },
        Role::Client => Access::Client {
            student_id: principal.id.clone(),
            trainer_id: profile.trainer_id.unwrap_or_default(),
        },
    };
    Ok(Some(access))
}

/// Make the principal a trainer and list them in the trainer directory
pub fn register_trainer<S: ProfileStore>(store: &S, principal: &Principal) -> Result<(), SessionError> {
    store.put_profile(
        &principal.id,
        &Profile {
            role: Role::Trainer,
            display_name: principal.display_name.clone(),
            trainer_id: None,
        },
    )?;
    store.put_trainer(&principal.id, &principal.display_name)?;
    info!("Registered trainer {}", principal.id);
    Ok(())
}

/// Bind the principal as a student of `trainer_code` and start them on an empty plan
pub fn link_to_trainer<S>(store: &S, principal: &Principal, trainer_code: &str) -> Result<(), SessionError>
where
    S: ProfileStore + PlanStore,
{
    let trainer_id = trainer_code.trim();
    if trainer_id.is_empty() {
        return Err(PlanError::EmptyField("trainer code").into());
    }
    if !store.trainer_exists(trainer_id)? {
        return Err(SessionError::InvalidTrainerCode(trainer_id.to_string()));
    }

    store.put_profile(
        &principal.id,
        &Profile {
            role: Role::Client,
            display_name: principal.display_name.clone(),
            trainer_id: Some(trainer_id.to_string()),
        },
    )?;
    store.link_student(trainer_id, &principal.id, &principal.display_name)?;
    store.upsert(&principal.id, &PlanDocument::new(Plan::default(), trainer_id), false)?;

    info!("Linked student {} to trainer {}", principal.id, trainer_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn create_principal(id: &str) -> Principal {
        Principal::new(id, format!("User {}", id))
    }

    #[test]
    fn test_unregistered_principal_has_no_access() {
        let db = Database::open(":memory:").unwrap();
        assert_eq!(resolve_access(&db, &create_principal("nobody")).unwrap(), None);
    }

    #[test]
    fn test_register_trainer() {
        let db = Database::open(":memory:").unwrap();
        let coach = create_principal("coach");
        register_trainer(&db, &coach).unwrap();

        assert!(db.trainer_exists("coach").unwrap());
        assert_eq!(
            resolve_access(&db, &coach).unwrap(),
            Some(Access::Trainer {
                trainer_id: "coach".to_string()
            })
        );
    }

    #[test]
    fn test_link_to_trainer() {
        let db = Database::open(":memory:").unwrap();
        register_trainer(&db, &create_principal("coach")).unwrap();
        let student = create_principal("ana");
        link_to_trainer(&db, &student, " coach ").unwrap();

        assert_eq!(
            resolve_access(&db, &student).unwrap(),
            Some(Access::Client {
                student_id: "ana".to_string(),
                trainer_id: "coach".to_string()
            })
        );
        let students = db.students("coach").unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].student_id, "ana");

        let doc = db.get("ana").unwrap().unwrap();
        assert_eq!(doc.trainer_id, "coach");
        assert!(doc.plan.is_empty());
    }

    #[test]
    fn test_link_rejects_bad_codes() {
        let db = Database::open(":memory:").unwrap();
        let student = create_principal("ana");

        assert!(matches!(
            link_to_trainer(&db, &student, "  "),
            Err(SessionError::Plan(PlanError::EmptyField(_)))
        ));
        assert!(matches!(
            link_to_trainer(&db, &student, "ghost"),
            Err(SessionError::InvalidTrainerCode(code)) if code == "ghost"
        ));
        assert_eq!(db.profile("ana").unwrap(), None);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!("personal".parse::<Role>(), Ok(Role::Trainer));
        assert_eq!("aluno".parse::<Role>(), Ok(Role::Client));
        assert_eq!(Role::Client.to_string(), "aluno");
    }
}
