use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cached copy of the signed-in user's record.
///
/// Field names follow the backend's JSON (`collectionId`, `avatar`, ...).
/// Fields this crate does not model are kept in `extra` so a record
/// survives a save/load cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            avatar: None,
            collection_id: None,
            collection_name: None,
            verified: false,
            created: None,
            updated: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name to show in the UI, falling back to the email's local part.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }

    /// Public URL of the avatar file, if the record has one.
    pub fn avatar_url(&self, base_url: &str) -> Option<String> {
        let avatar = self.avatar.as_deref().filter(|a| !a.is_empty())?;
        let collection = self
            .collection_id
            .as_deref()
            .or(self.collection_name.as_deref())?;
        Some(format!(
            "{}/api/files/{}/{}/{}",
            base_url.trim_end_matches('/'),
            collection,
            self.id,
            avatar
        ))
    }
}
