//! Action bitsets and the vocabulary that names their bits.
//!
//! Every primitive action owns one bit of a `u32`, so an [`ActionSet`] holds
//! any combination of up to 32 actions. The name ↔ bit mapping lives in an
//! [`ActionVocabulary`] value owned by each authorizer instead of in
//! process-wide state.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// Maximum number of primitive actions a vocabulary can name.
pub const MAX_ACTIONS: usize = 32;

/// A set of primitive actions, one bit each.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(u32);

impl ActionSet {
    pub const EMPTY: Self = Self(0);
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const EXEC: Self = Self(1 << 2);
    pub const READ_WRITE: Self = Self(Self::READ.0 | Self::WRITE.0);
    pub const READ_EXEC: Self = Self(Self::READ.0 | Self::EXEC.0);
    pub const WRITE_EXEC: Self = Self(Self::WRITE.0 | Self::EXEC.0);
    pub const READ_WRITE_EXEC: Self = Self(Self::READ.0 | Self::WRITE.0 | Self::EXEC.0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Actions in `self` that are not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Superset test: every action of `other` is in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_subset_of(self, other: Self) -> bool {
        other.contains(self)
    }

    /// Number of primitive actions in the set.
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for ActionSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ActionSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ActionSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl Sub for ActionSet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

/// Ordered action names; the i-th name owns bit i.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionVocabulary {
    names: Vec<String>,
}

impl Default for ActionVocabulary {
    /// `read`, `write`, `exec`, matching the [`ActionSet`] constants.
    fn default() -> Self {
        Self {
            names: vec!["read".to_string(), "write".to_string(), "exec".to_string()],
        }
    }
}

impl ActionVocabulary {
    /// Build a vocabulary that replaces the defaults.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(AuthzError::Config("action vocabulary is empty".to_string()));
        }
        if names.len() > MAX_ACTIONS {
            return Err(AuthzError::Config(format!(
                "action vocabulary has {} names (max: {})",
                names.len(),
                MAX_ACTIONS
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(AuthzError::Config(format!("action #{i} has an empty name")));
            }
            if names[..i].contains(name) {
                return Err(AuthzError::Config(format!("duplicate action name: {name}")));
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The universal set: every action this vocabulary names.
    pub fn all(&self) -> ActionSet {
        if self.names.len() >= MAX_ACTIONS {
            ActionSet::from_bits(u32::MAX)
        } else {
            ActionSet::from_bits((1u32 << self.names.len()) - 1)
        }
    }

    /// Look up a single action by name.
    pub fn action(&self, name: &str) -> Option<ActionSet> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ActionSet::from_bits(1 << i))
    }

    /// Union of the named actions.
    pub fn parse<S: AsRef<str>>(&self, names: &[S]) -> Result<ActionSet> {
        names.iter().try_fold(ActionSet::EMPTY, |acc, name| {
            let name = name.as_ref();
            self.action(name)
                .map(|a| acc | a)
                .ok_or_else(|| AuthzError::UnknownAction(name.to_string()))
        })
    }

    /// Names of the actions in `set`, in bit order. Bits outside the
    /// vocabulary are ignored.
    pub fn names_of(&self, set: ActionSet) -> Vec<&str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, _)| set.contains(ActionSet::from_bits(1 << i)))
            .map(|(_, n)| n.as_str())
            .collect()
    }
}
