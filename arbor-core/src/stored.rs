//! Server-acknowledged record wrapper
//!
//! `Stored<Id, T>` pairs server-assigned identity and creation time with the
//! record body. Records are append-only: nothing in the core mutates a stored
//! record after it has been received.

use chrono::{DateTime, Utc};
use std::ops::Deref;

/// A record the server has acknowledged, with its ID and creation time.
///
/// Implements `Deref` to allow transparent access to the inner record.
#[derive(Clone, Debug, PartialEq)]
pub struct Stored<Id, T> {
    pub id: Id,
    pub content: T,
    pub created_at: DateTime<Utc>,
}

impl<Id, T> Stored<Id, T> {
    pub fn new(id: Id, content: T, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            content,
            created_at,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn into_content(self) -> T {
        self.content
    }
}

impl<Id, T> Deref for Stored<Id, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.content
    }
}

impl<Id: Copy, T> Stored<Id, T> {
    /// Ordering key: creation time, then id as a tiebreaker
    pub fn order_key(&self) -> (DateTime<Utc>, Id) {
        (self.created_at, self.id)
    }
}
