//! Ambient caller identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::EntityReference;

/// Identity of the caller on whose behalf operations run.
///
/// Consumed by the identity-relative condition operators and stamped as owner on
/// created records. Collaborators layering security read it as well.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// The calling user.
    pub user_id: Uuid,
    /// The calling user's business unit.
    pub business_unit_id: Uuid,
    /// The organization.
    pub organization_id: Uuid,
}

impl CallerContext {
    /// Creates a caller context from explicit identifiers.
    pub fn new(user_id: Uuid, business_unit_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            business_unit_id,
            organization_id,
        }
    }

    /// Reference to the calling user.
    pub fn user_reference(&self) -> EntityReference {
        EntityReference::new("systemuser", self.user_id)
    }

    /// Reference to the calling user's business unit.
    pub fn business_unit_reference(&self) -> EntityReference {
        EntityReference::new("businessunit", self.business_unit_id)
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }
}
