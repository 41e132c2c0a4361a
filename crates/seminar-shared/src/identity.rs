use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// The authenticated identity handed to the core by the host application.
/// Obtained out-of-band (session or local storage); the core never performs
/// authentication itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Identity {
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
        }
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    /// Teachers and admins share the staff-facing surfaces.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_role_predicates() {
        let student = Identity::new(UserId(Uuid::new_v4()), "Ada", "ada@example.edu", Role::Student);
        assert!(student.is_student());
        assert!(!student.is_staff());

        let teacher = Identity::new(UserId(Uuid::new_v4()), "Grace", "g@example.edu", Role::Teacher);
        assert!(teacher.is_staff());
    }

    #[test]
    fn test_identity_serde_roundtrip() {
        let id = Identity::new(UserId(Uuid::new_v4()), "Ada", "ada@example.edu", Role::Admin);
        let json = serde_json::to_string(&id).unwrap();
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
