//! Persistence seam for fields.

use async_trait::async_trait;

use crate::error::Result;
use crate::field::Field;

/// Storage that can persist a field, including any rename or retype the
/// field has pending.
#[async_trait]
pub trait FieldStore: Send {
    /// Persist `field`. On success the store assigns an id to new fields and
    /// clears the pending markers and change tracking.
    async fn save_field(&mut self, field: &mut Field) -> Result<bool>;
}
