//! Denormalized user × article decision table.

use ahash::{AHashMap, AHashSet};

use crate::actions::ActionSet;
use crate::types::{Article, User};

/// Effective actions per (user, article), plus the reverse index needed to
/// repair an article column without scanning every user.
///
/// Empty cells are never stored, so `len` counts only pairs with access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionCache {
    rows: AHashMap<User, AHashMap<Article, ActionSet>>,
    holders: AHashMap<Article, AHashSet<User>>,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached actions for the pair. Missing means no access.
    pub fn get(&self, user: &User, article: &Article) -> ActionSet {
        self.rows
            .get(user)
            .and_then(|row| row.get(article))
            .copied()
            .unwrap_or_default()
    }

    /// Every article `user` holds actions on.
    pub fn row(&self, user: &User) -> Option<&AHashMap<Article, ActionSet>> {
        self.rows.get(user)
    }

    /// Every user holding actions on `article`.
    pub fn holders(&self, article: &Article) -> Option<&AHashSet<User>> {
        self.holders.get(article)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.rows.keys()
    }

    /// Number of stored (user, article) cells.
    pub fn len(&self) -> usize {
        self.rows.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// OR `actions` into the cell.
    pub(crate) fn grant(&mut self, user: &User, article: &Article, actions: ActionSet) {
        let current = self.get(user, article);
        self.set(user, article, current | actions);
    }

    /// Overwrite the cell; an empty set removes it.
    pub(crate) fn set(&mut self, user: &User, article: &Article, actions: ActionSet) {
        if actions.is_empty() {
            if let Some(row) = self.rows.get_mut(user) {
                row.remove(article);
                if row.is_empty() {
                    self.rows.remove(user);
                }
            }
            if let Some(users) = self.holders.get_mut(article) {
                users.remove(user);
                if users.is_empty() {
                    self.holders.remove(article);
                }
            }
            return;
        }
        self.rows
            .entry(user.clone())
            .or_default()
            .insert(article.clone(), actions);
        self.holders
            .entry(article.clone())
            .or_default()
            .insert(user.clone());
    }

    /// Replace the whole row of `user`.
    pub(crate) fn replace_row(&mut self, user: &User, row: AHashMap<Article, ActionSet>) {
        self.remove_user(user);
        for (article, actions) in row {
            self.set(user, &article, actions);
        }
    }

    pub(crate) fn remove_user(&mut self, user: &User) {
        if let Some(row) = self.rows.remove(user) {
            for article in row.keys() {
                if let Some(users) = self.holders.get_mut(article) {
                    users.remove(user);
                    if users.is_empty() {
                        self.holders.remove(article);
                    }
                }
            }
        }
    }

    pub(crate) fn remove_article(&mut self, article: &Article) {
        if let Some(users) = self.holders.remove(article) {
            for user in users {
                if let Some(row) = self.rows.get_mut(&user) {
                    row.remove(article);
                    if row.is_empty() {
                        self.rows.remove(&user);
                    }
                }
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.holders.clear();
    }
}
