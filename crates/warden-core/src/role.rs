//! Role identifiers
//!
//! A role names a relation a principal may hold, optionally scoped to an
//! entity type. Roles are parsed from dotted strings (`entity.relation`)
//! or built explicitly, and are pure immutable values: two roles with the
//! same name are the same role.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named relation, optionally scoped to an entity type.
///
/// The role's `name` is its identity: `entity.relation` when scoped,
/// plain `relation` otherwise.
///
/// # Examples
///
/// ```
/// use warden_core::Role;
///
/// let admin = Role::simple("admin").unwrap();
/// assert_eq!(admin.name(), "admin");
/// assert!(!admin.is_scoped());
///
/// let owner = Role::parse("organization.owner").unwrap();
/// assert_eq!(owner.entity(), Some("organization"));
/// assert_eq!(owner.relation(), "owner");
/// assert_eq!(owner.name(), "organization.owner");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "String", try_from = "String")]
pub struct Role {
    entity: Option<String>,
    relation: String,
    name: String,
}

impl Role {
    /// Create a role with no entity scope.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRelation`] if `relation` is empty.
    pub fn simple(relation: impl Into<String>) -> Result<Self, ConfigError> {
        Self::build(None, relation.into())
    }

    /// Create a role scoped to an entity type.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `relation` is empty or `entity` is
    /// empty.
    pub fn scoped(entity: impl Into<String>, relation: impl Into<String>) -> Result<Self, ConfigError> {
        Self::build(Some(entity.into()), relation.into())
    }

    /// Parse a role from its dotted string form.
    ///
    /// One segment is a simple role, two segments are `entity.relation`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for more than two segments, an empty
    /// relation, or an empty entity segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::Role;
    ///
    /// assert!(Role::parse("admin").is_ok());
    /// assert!(Role::parse("organization.owner").is_ok());
    /// assert!(Role::parse("a.b.c").is_err());
    /// assert!(Role::parse("organization.").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let segments: Vec<&str> = name.split('.').collect();
        match segments.as_slice() {
            [relation] => Self::build(None, (*relation).to_string()),
            [entity, relation] => {
                if entity.is_empty() {
                    return Err(ConfigError::MalformedRole(name.to_string()));
                }
                Self::build(Some((*entity).to_string()), (*relation).to_string())
            }
            _ => Err(ConfigError::MalformedRole(name.to_string())),
        }
    }

    fn build(entity: Option<String>, relation: String) -> Result<Self, ConfigError> {
        if relation.is_empty() {
            return Err(ConfigError::MissingRelation);
        }
        if let Some(entity) = &entity {
            if entity.is_empty() {
                return Err(ConfigError::MalformedRole(format!(".{}", relation)));
            }
        }
        let name = match &entity {
            Some(entity) => format!("{}.{}", entity, relation),
            None => relation.clone(),
        };
        Ok(Self {
            entity,
            relation,
            name,
        })
    }

    /// Get the entity type this role is scoped to, if any.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the relation part of the role.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Get the full role name (`entity.relation` or `relation`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this role is scoped to an entity type.
    pub fn is_scoped(&self) -> bool {
        self.entity.is_some()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.name
    }
}

impl TryFrom<String> for Role {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value)
    }
}

impl TryFrom<&str> for Role {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Role::parse(value)
    }
}

/// Conversion into a [`Role`], used by registration APIs that accept
/// either parsed roles or their dotted string form.
pub trait IntoRole {
    /// Convert into a role, validating string forms.
    fn into_role(self) -> Result<Role, ConfigError>;
}

impl IntoRole for Role {
    fn into_role(self) -> Result<Role, ConfigError> {
        Ok(self)
    }
}

impl IntoRole for &Role {
    fn into_role(self) -> Result<Role, ConfigError> {
        Ok(self.clone())
    }
}

impl IntoRole for &str {
    fn into_role(self) -> Result<Role, ConfigError> {
        Role::parse(self)
    }
}

impl IntoRole for String {
    fn into_role(self) -> Result<Role, ConfigError> {
        Role::parse(&self)
    }
}
