//! Data-sharing recipients: API model, client seam and the managed resource.

mod api;
pub mod model;
pub mod recipient;

pub use api::RecipientsApi;
pub use model::{
    AuthenticationType, CreateRecipient, IpAccessList, RecipientInfo, RecipientTokenInfo,
    SecurablePropertiesKvPairs, UpdateRecipient, SERVER_MANAGED_PREFIX,
};
pub use recipient::{
    recipient_properties_suppress, recipient_schema, RecipientResource, RESOURCE_TYPE,
};
