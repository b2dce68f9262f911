//! Request and response shapes of the recipients API.
//!
//! These structs double as the mapping between provider state and the API:
//! state is deserialized into [`CreateRecipient`] / [`UpdateRecipient`], and a
//! fetched [`RecipientInfo`] is serialized back into state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of property keys the server manages itself.
///
/// Such keys are never sent to the server and never recorded in state.
pub const SERVER_MANAGED_PREFIX: &str = "databricks.";

/// How a recipient authenticates to read shared data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationType {
    /// Open sharing with bearer tokens.
    Token,
    /// Sharing between metastores of the same service.
    Databricks,
}

impl AuthenticationType {
    /// The wire values, in declaration order.
    pub const VALUES: [&'static str; 2] = ["TOKEN", "DATABRICKS"];

    /// The wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "TOKEN",
            Self::Databricks => "DATABRICKS",
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IP addresses allowed to use a token recipient's credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAccessList {
    /// Allowed addresses or CIDR ranges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_ip_addresses: Vec<String>,
}

/// Free-form recipient properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurablePropertiesKvPairs {
    /// Property values by key.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl SecurablePropertiesKvPairs {
    /// Drop every server-managed key, returning how many were removed.
    pub fn strip_server_managed(&mut self) -> usize {
        let before = self.properties.len();
        self.properties
            .retain(|key, _| !key.starts_with(SERVER_MANAGED_PREFIX));
        before - self.properties.len()
    }
}

/// An activation token issued to a recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientTokenInfo {
    /// Token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Link the recipient opens to download credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_url: Option<String>,
    /// Creation time, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Who created it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Expiry time, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    /// Last modification time, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Who last modified it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// A recipient as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInfo {
    /// Unique name; also the resource identifier.
    pub name: String,
    /// How the recipient authenticates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<AuthenticationType>,
    /// Owning user or group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Only ever set by the caller on create; servers do not echo it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing_code: Option<String>,
    /// Global metastore id of a `DATABRICKS` recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_recipient_global_metastore_id: Option<String>,
    /// Addresses a `TOKEN` recipient may connect from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_access_list: Option<IpAccessList>,
    /// Free-form properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_kvpairs: Option<SecurablePropertiesKvPairs>,
    /// Whether the recipient has activated its credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated: Option<bool>,
    /// Link the recipient opens to download credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_url: Option<String>,
    /// Cloud of the recipient's metastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    /// Region of the recipient's metastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Id of the recipient's metastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metastore_id: Option<String>,
    /// Creation time, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Who created it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Last modification time, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Who last modified it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Activation tokens, newest last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<RecipientTokenInfo>,
}

/// Request to create a recipient.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecipient {
    /// Recipient name.
    pub name: String,
    /// How the recipient authenticates.
    pub authentication_type: AuthenticationType,
    /// Owning user or group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// One-time code issued by the recipient's metastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing_code: Option<String>,
    /// Global metastore id of a `DATABRICKS` recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_recipient_global_metastore_id: Option<String>,
    /// Addresses a `TOKEN` recipient may connect from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_access_list: Option<IpAccessList>,
    /// Free-form properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_kvpairs: Option<SecurablePropertiesKvPairs>,
}

impl CreateRecipient {
    /// A minimal request with only the required fields.
    pub fn new(name: impl Into<String>, authentication_type: AuthenticationType) -> Self {
        Self {
            name: name.into(),
            authentication_type,
            owner: None,
            comment: None,
            sharing_code: None,
            data_recipient_global_metastore_id: None,
            ip_access_list: None,
            properties_kvpairs: None,
        }
    }
}

// Hand-written so the sharing code never reaches a log line.
impl fmt::Debug for CreateRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateRecipient")
            .field("name", &self.name)
            .field("authentication_type", &self.authentication_type)
            .field("owner", &self.owner)
            .field("comment", &self.comment)
            .field(
                "sharing_code",
                &self.sharing_code.as_ref().map(|_| "(sensitive value)"),
            )
            .field(
                "data_recipient_global_metastore_id",
                &self.data_recipient_global_metastore_id,
            )
            .field("ip_access_list", &self.ip_access_list)
            .field("properties_kvpairs", &self.properties_kvpairs)
            .finish()
    }
}

/// Request to update a recipient.
///
/// Unset fields are left untouched by the server. A request carrying only
/// `name` and `owner` is an owner transfer, which the server handles on its
/// own path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecipient {
    /// Recipient name.
    #[serde(default)]
    pub name: String,
    /// Owning user or group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Addresses a `TOKEN` recipient may connect from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_access_list: Option<IpAccessList>,
    /// Free-form properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties_kvpairs: Option<SecurablePropertiesKvPairs>,
}

impl UpdateRecipient {
    /// An owner transfer. An empty owner is left out of the request.
    pub fn owner_only(name: impl Into<String>, owner: &str) -> Self {
        Self {
            name: name.into(),
            owner: (!owner.is_empty()).then(|| owner.to_string()),
            ..Default::default()
        }
    }

    /// Whether the request carries nothing but an owner transfer.
    pub fn is_owner_only(&self) -> bool {
        self.comment.is_none() && self.ip_access_list.is_none() && self.properties_kvpairs.is_none()
    }
}
