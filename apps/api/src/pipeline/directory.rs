//! Placement Directory Guard — excludes students already placed anywhere at
//! the same college.
//!
//! The directory is scoped by college, not company: a student placed by one
//! company is unavailable to every other company recruiting at that college.
//! Every call re-reads the directory. Callers that check-then-write must take
//! a fresh [`PlacedSnapshot`] immediately before the write.

use tracing::debug;

use crate::pipeline::identity::{HasIdentity, IdentityIndex};
use crate::store::{PlacementStore, StoreError};

/// Point-in-time view of one college's placed students.
#[derive(Debug, Clone, Default)]
pub struct PlacedSnapshot {
    index: IdentityIndex,
}

impl PlacedSnapshot {
    pub fn from_records<'a, T: HasIdentity + 'a>(records: impl IntoIterator<Item = &'a T>) -> Self {
        Self {
            index: records.into_iter().collect(),
        }
    }

    pub fn is_already_placed<T: HasIdentity>(&self, student: &T) -> bool {
        self.index.contains(&student.identity())
    }

    pub fn filter_available<T: HasIdentity>(&self, students: Vec<T>) -> Vec<T> {
        students
            .into_iter()
            .filter(|s| !self.is_already_placed(s))
            .collect()
    }
}

pub struct PlacementDirectory<'a> {
    store: &'a dyn PlacementStore,
}

impl<'a> PlacementDirectory<'a> {
    pub fn new(store: &'a dyn PlacementStore) -> Self {
        Self { store }
    }

    /// Fresh read of the placed directory for `college`. Never cached.
    pub async fn snapshot(&self, college: &str) -> Result<PlacedSnapshot, StoreError> {
        let placed = self.store.list_placed(college).await?;
        debug!("Placed directory for {college}: {} records", placed.len());
        Ok(PlacedSnapshot::from_records(placed.iter()))
    }
}
