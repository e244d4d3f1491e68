use crate::error::RidgegateError;
use crate::features::FeatureSet;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Identity of an enrolled user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId(id)
    }
}

/// The single biometric template of a user. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrolledTemplate {
    pub user_id: UserId,
    pub feature_set: FeatureSet,
}

/// Persistence of enrolled templates, at most one per user.
pub trait EnrollmentStore: Send + Sync {
    fn get_by_user_id(&self, user_id: UserId) -> Result<Option<EnrolledTemplate>, RidgegateError>;

    /// Creates the user's template.
    ///
    /// # Errors
    /// Returns `Conflict` if the user already has one.
    fn create(
        &self,
        user_id: UserId,
        feature_set: FeatureSet,
    ) -> Result<EnrolledTemplate, RidgegateError>;

    /// Deletes the user's template, returning whether one existed.
    fn delete(&self, user_id: UserId) -> Result<bool, RidgegateError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryEnrollmentStore {
    templates: RwLock<HashMap<UserId, EnrolledTemplate>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EnrollmentStore for InMemoryEnrollmentStore {
    fn get_by_user_id(&self, user_id: UserId) -> Result<Option<EnrolledTemplate>, RidgegateError> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        Ok(templates.get(&user_id).cloned())
    }

    fn create(
        &self,
        user_id: UserId,
        feature_set: FeatureSet,
    ) -> Result<EnrolledTemplate, RidgegateError> {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        match templates.entry(user_id) {
            Entry::Occupied(_) => Err(RidgegateError::Conflict(user_id)),
            Entry::Vacant(slot) => {
                let template = EnrolledTemplate { user_id, feature_set };
                slot.insert(template.clone());
                debug!("Stored template {} for user {}", template.feature_set.digest(), user_id);
                Ok(template)
            }
        }
    }

    fn delete(&self, user_id: UserId) -> Result<bool, RidgegateError> {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        Ok(templates.remove(&user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_enforces_uniqueness() {
        let store = InMemoryEnrollmentStore::new();
        let first: FeatureSet = ["a", "b"].into_iter().collect();
        let second: FeatureSet = ["c"].into_iter().collect();

        assert!(store.create(UserId(1), first.clone()).is_ok());
        assert!(matches!(
            store.create(UserId(1), second),
            Err(RidgegateError::Conflict(UserId(1)))
        ));

        match store.get_by_user_id(UserId(1)) {
            Ok(Some(template)) => assert_eq!(template.feature_set, first),
            other => panic!("Unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn delete_allows_reenrollment() {
        let store = InMemoryEnrollmentStore::new();
        let features: FeatureSet = ["a"].into_iter().collect();

        assert!(store.create(UserId(5), features.clone()).is_ok());
        assert!(matches!(store.delete(UserId(5)), Ok(true)));
        assert!(matches!(store.delete(UserId(5)), Ok(false)));
        assert!(store.is_empty());
        assert!(store.create(UserId(5), features).is_ok());
    }
}
