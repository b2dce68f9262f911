//! The remote recipients service consumed by the provider.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::sharing::model::{CreateRecipient, RecipientInfo, UpdateRecipient};

/// Client for the recipients endpoints of the sharing service.
///
/// Implementations own transport concerns: authentication, retries and
/// timeouts. Errors should use the [`ProviderError`] variant matching the
/// remote failure, in particular [`ProviderError::NotFound`] for a missing
/// recipient. The provider passes them on unchanged.
///
/// Dropping a returned future cancels the call.
#[async_trait]
pub trait RecipientsApi: Send + Sync {
    /// Create a recipient and return it as the server stored it.
    async fn create(&self, request: CreateRecipient) -> Result<RecipientInfo, ProviderError>;

    /// Fetch a recipient by name.
    async fn get_by_name(&self, name: &str) -> Result<RecipientInfo, ProviderError>;

    /// Apply an update. Fields left as `None` are not touched.
    async fn update(&self, request: UpdateRecipient) -> Result<(), ProviderError>;

    /// Delete a recipient by name.
    async fn delete_by_name(&self, name: &str) -> Result<(), ProviderError>;
}
