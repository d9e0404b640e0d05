//! Permission engine: grants of action sets from subjects to objects, and
//! the combinators that resolve grants inherited through groups.

pub mod direct;
pub mod grouped;

pub use direct::DirectPermissions;
pub use grouped::{BothGrouped, ObjectGrouped, SubjectGrouped};

use ahash::AHashMap;

use crate::actions::ActionSet;
use crate::error::Result;
use crate::types::{Grant, Object, Subject};

/// Read half of the permission contract.
pub trait PermissionReader {
    /// Every action `subject` may perform on `object`.
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet>;

    /// True if every action in `actions` is permitted.
    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        Ok(self.permitted_actions(subject, object)?.contains(actions))
    }

    /// Every subject holding actions on `object`.
    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>>;

    /// Every object `subject` holds actions on.
    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>>;
}

/// Write half of the permission contract.
pub trait Permissions: PermissionReader {
    /// OR `actions` into the stored grant.
    fn permit(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()>;

    /// Clear `actions` from the stored grant. Clearing absent actions is a no-op.
    fn revoke(&mut self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<()>;

    /// Drop every grant held by `subject`.
    fn remove_subject(&mut self, subject: &Subject) -> Result<()>;

    /// Drop every grant on `object`.
    fn remove_object(&mut self, object: &Object) -> Result<()>;

    /// Every stored grant.
    fn grants(&self) -> Result<Vec<Grant>>;
}

impl<T: PermissionReader + ?Sized> PermissionReader for &T {
    fn permitted_actions(&self, subject: &Subject, object: &Object) -> Result<ActionSet> {
        (**self).permitted_actions(subject, object)
    }

    fn shall(&self, subject: &Subject, object: &Object, actions: ActionSet) -> Result<bool> {
        (**self).shall(subject, object, actions)
    }

    fn permissions_on(&self, object: &Object) -> Result<AHashMap<Subject, ActionSet>> {
        (**self).permissions_on(object)
    }

    fn permissions_for(&self, subject: &Subject) -> Result<AHashMap<Object, ActionSet>> {
        (**self).permissions_for(subject)
    }
}
