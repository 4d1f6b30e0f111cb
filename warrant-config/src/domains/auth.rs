//! Authorization scope configuration
//!
//! An auth scope ties one subject type to its role, permission and join
//! entities. Table names and foreign keys are derived from the entity names
//! by convention unless a join name is overridden explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ConfigResult;
use crate::validation::{validate_entity_name, Validatable};

/// Name of the scope used when no scope is configured
pub const DEFAULT_SCOPE: &str = "main";

/// Per-scope authorization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthScopeConfig {
    /// Whether subjects in this scope can hold permissions (directly or via roles)
    #[serde(default = "crate::domains::utils::default_true")]
    pub with_permissions: bool,

    /// Default for `force_context` when a call does not specify it
    #[serde(default = "crate::domains::utils::default_false")]
    pub force_context: bool,

    /// Entity naming
    #[serde(default)]
    pub entities: EntityNames,
}

impl Default for AuthScopeConfig {
    fn default() -> Self {
        Self {
            with_permissions: true,
            force_context: false,
            entities: EntityNames::default(),
        }
    }
}

/// Entity names for a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityNames {
    pub subject: String,
    pub role: String,
    pub permission: String,

    /// Subject/role join, defaults to `{role}{subject}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_subject: Option<String>,

    /// Subject/permission join, defaults to `{permission}{subject}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_subject: Option<String>,

    /// Role/permission join, defaults to `{permission}{role}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_role: Option<String>,
}

impl Default for EntityNames {
    fn default() -> Self {
        Self {
            subject: "User".to_string(),
            role: "Role".to_string(),
            permission: "Permission".to_string(),
            role_subject: None,
            permission_subject: None,
            permission_role: None,
        }
    }
}

impl EntityNames {
    pub fn role_subject(&self) -> String {
        self.role_subject
            .clone()
            .unwrap_or_else(|| format!("{}{}", last_segment(&self.role), last_segment(&self.subject)))
    }

    pub fn permission_subject(&self) -> String {
        self.permission_subject.clone().unwrap_or_else(|| {
            format!("{}{}", last_segment(&self.permission), last_segment(&self.subject))
        })
    }

    pub fn permission_role(&self) -> String {
        self.permission_role.clone().unwrap_or_else(|| {
            format!("{}{}", last_segment(&self.permission), last_segment(&self.role))
        })
    }

    /// Foreign key column referencing the subject (`User` -> `user_id`)
    pub fn subject_foreign_key(&self) -> String {
        foreign_key(&self.subject)
    }

    /// Foreign key column referencing a role (`Role` -> `role_id`)
    pub fn role_foreign_key(&self) -> String {
        foreign_key(&self.role)
    }

    /// Foreign key column referencing a permission
    pub fn permission_foreign_key(&self) -> String {
        foreign_key(&self.permission)
    }

    /// All table names derived from this naming, in declaration order
    pub fn table_names(&self) -> [String; 5] {
        [
            table_name(&self.role),
            table_name(&self.permission),
            table_name(&self.role_subject()),
            table_name(&self.permission_subject()),
            table_name(&self.permission_role()),
        ]
    }
}

impl Validatable for AuthScopeConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        let names = &self.entities;

        validate_entity_name(&names.subject, "entities.subject", domain)?;
        validate_entity_name(&names.role, "entities.role", domain)?;
        validate_entity_name(&names.permission, "entities.permission", domain)?;
        validate_entity_name(&names.role_subject(), "entities.role_subject", domain)?;
        validate_entity_name(&names.permission_subject(), "entities.permission_subject", domain)?;
        validate_entity_name(&names.permission_role(), "entities.permission_role", domain)?;

        let mut seen = HashSet::new();
        for table in names.table_names() {
            if !seen.insert(table.clone()) {
                return Err(self.validation_error(format!(
                    "entity names map to the same table '{}'",
                    table
                )));
            }
        }

        let foreign_keys = [
            names.subject_foreign_key(),
            names.role_foreign_key(),
            names.permission_foreign_key(),
        ];
        if foreign_keys[0] == foreign_keys[1] || foreign_keys[0] == foreign_keys[2] {
            return Err(self.validation_error(format!(
                "subject foreign key '{}' collides with a role or permission foreign key",
                foreign_keys[0]
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "auth"
    }
}

/// Snake-case form of an entity name (`Admin::RoleUser` -> `admin_role_user`)
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.replace("::", "_").chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Table name for an entity: snake case, pluralized
pub fn table_name(entity: &str) -> String {
    pluralize(&snake_case(entity))
}

/// Foreign key column for an entity: last namespace segment, snake case, `_id`
pub fn foreign_key(entity: &str) -> String {
    format!("{}_id", snake_case(last_segment(entity)))
}

fn last_segment(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        format!("{}es", word)
    } else if let Some(stem) = word.strip_suffix('y') {
        match stem.chars().last() {
            Some(c) if !"aeiou".contains(c) => format!("{}ies", stem),
            _ => format!("{}s", word),
        }
    } else {
        format!("{}s", word)
    }
}
