//! DID document model and patch composer.
//!
//! Documents and their parts keep insertion order (`Vec`s throughout) so
//! that serializing a resolved document is deterministic across replicas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// `@context` installed on service entries created by a patch.
pub const HUB_ENDPOINT_CONTEXT: &str = "schema.identity.foundation/hub";

/// `@type` installed on service entries created by a patch.
pub const HUB_ENDPOINT_TYPE: &str = "UserServiceEndpoint";

/// An external DID document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// The DID this document describes. Assigned by the processor; not
    /// part of the wire form inside operation data.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Public keys, in insertion order.
    #[serde(default)]
    pub public_key: Vec<DocumentKey>,
    /// Service entries, in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<DocumentService>,
}

impl DidDocument {
    /// Find a public key by id.
    pub fn key(&self, id: &str) -> Option<&DocumentKey> {
        self.public_key.iter().find(|k| k.id == id)
    }
}

/// A public key entry in a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    /// Key identifier, e.g. `#key1`.
    pub id: String,
    /// Verification method type.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Controller DID. Always overwritten with the document id when the
    /// key is added through a patch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub controller: String,
    /// What the key is allowed to authorize.
    pub usage: KeyUsage,
    /// Compressed SEC1 public key in hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
}

/// Declared usage of a document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    /// Guards Recover and Revoke. Not removable through Update patches.
    Recovery,
    /// Authorizes Update operations.
    Signing,
    /// Usage values this version does not know; preserved verbatim-ish
    /// so future documents still replay.
    #[serde(other)]
    Other,
}

/// A service entry in a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentService {
    /// Service type, the lookup key for endpoint patches.
    #[serde(rename = "type")]
    pub service_type: String,
    /// The endpoint descriptor.
    pub service_endpoint: ServiceEndpoint,
}

/// Hub-style service endpoint descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Endpoint schema context.
    #[serde(rename = "@context")]
    pub context: String,
    /// Endpoint schema type.
    #[serde(rename = "@type")]
    pub endpoint_type: String,
    /// Endpoint instances, in insertion order.
    #[serde(default)]
    pub instances: Vec<String>,
}

/// Bare secp256k1 public key carried in suffix data and recovery
/// payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPublicKey {
    /// Compressed SEC1 public key in hex.
    pub public_key_hex: String,
}

/// A single document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Append public keys; duplicates by id are skipped.
    AddPublicKeys {
        /// Keys to append.
        public_keys: Vec<DocumentKey>,
    },
    /// Remove public keys by id. Recovery keys are never removed.
    RemovePublicKeys {
        /// Ids of the keys to remove.
        ids: Vec<String>,
    },
    /// Append endpoints to the service of the given type, creating the
    /// service entry if absent.
    AddServiceEndpoints {
        /// Service type to patch.
        service_type: String,
        /// Endpoints to append.
        endpoints: Vec<String>,
    },
    /// Remove endpoints from the service of the given type. A missing
    /// service is a no-op.
    RemoveServiceEndpoints {
        /// Service type to patch.
        service_type: String,
        /// Endpoints to remove.
        endpoints: Vec<String>,
    },
    /// A patch action this version does not know. Applying it is a
    /// no-op so that future patch types never break replay.
    Unknown,
}

/// Known wire actions; anything else becomes [`Patch::Unknown`].
const KNOWN_ACTIONS: [&str; 4] = [
    "add-public-keys",
    "remove-public-keys",
    "add-service-endpoints",
    "remove-service-endpoints",
];

#[derive(Deserialize)]
#[serde(tag = "action")]
enum WirePatch {
    #[serde(rename = "add-public-keys", rename_all = "camelCase")]
    AddPublicKeys { public_keys: Vec<DocumentKey> },
    #[serde(rename = "remove-public-keys", rename_all = "camelCase")]
    RemovePublicKeys { public_keys: Vec<String> },
    #[serde(rename = "add-service-endpoints", rename_all = "camelCase")]
    AddServiceEndpoints {
        service_type: String,
        service_endpoints: Vec<String>,
    },
    #[serde(rename = "remove-service-endpoints", rename_all = "camelCase")]
    RemoveServiceEndpoints {
        service_type: String,
        service_endpoints: Vec<String>,
    },
}

impl Patch {
    /// Parse a patch from its wire form.
    ///
    /// An unknown `action` yields [`Patch::Unknown`]; a known action with
    /// a malformed body is an error.
    pub fn from_value(value: &Value) -> Result<Self> {
        let action = value
            .get("action")
            .ok_or_else(|| CoreError::MissingOrUnknownProperty("action".to_string()))?
            .as_str()
            .ok_or_else(|| CoreError::TypeIncorrect("action".to_string()))?;

        if !KNOWN_ACTIONS.contains(&action) {
            return Ok(Patch::Unknown);
        }

        let patch = match serde_json::from_value::<WirePatch>(value.clone())? {
            WirePatch::AddPublicKeys { public_keys } => Patch::AddPublicKeys { public_keys },
            WirePatch::RemovePublicKeys { public_keys } => {
                Patch::RemovePublicKeys { ids: public_keys }
            }
            WirePatch::AddServiceEndpoints {
                service_type,
                service_endpoints,
            } => Patch::AddServiceEndpoints {
                service_type,
                endpoints: service_endpoints,
            },
            WirePatch::RemoveServiceEndpoints {
                service_type,
                service_endpoints,
            } => Patch::RemoveServiceEndpoints {
                service_type,
                endpoints: service_endpoints,
            },
        };
        Ok(patch)
    }
}

/// Apply an ordered patch list to a document, returning the patched copy.
///
/// The composer is pure and deterministic: the input ordering fully
/// determines the output.
pub fn apply_patches(document: &DidDocument, patches: &[Patch]) -> DidDocument {
    let mut document = document.clone();
    for patch in patches {
        apply_patch(&mut document, patch);
    }
    document
}

fn apply_patch(document: &mut DidDocument, patch: &Patch) {
    match patch {
        Patch::AddPublicKeys { public_keys } => {
            for key in public_keys {
                if document.public_key.iter().any(|k| k.id == key.id) {
                    continue;
                }
                let mut key = key.clone();
                // Controller is server-assigned; a client-supplied value
                // is discarded.
                key.controller = document.id.clone();
                document.public_key.push(key);
            }
        }
        Patch::RemovePublicKeys { ids } => {
            document
                .public_key
                .retain(|k| k.usage == KeyUsage::Recovery || !ids.contains(&k.id));
        }
        Patch::AddServiceEndpoints {
            service_type,
            endpoints,
        } => {
            let index = match document
                .service
                .iter()
                .position(|s| s.service_type == *service_type)
            {
                Some(index) => index,
                None => {
                    document.service.push(DocumentService {
                        service_type: service_type.clone(),
                        service_endpoint: ServiceEndpoint {
                            context: HUB_ENDPOINT_CONTEXT.to_string(),
                            endpoint_type: HUB_ENDPOINT_TYPE.to_string(),
                            instances: Vec::new(),
                        },
                    });
                    document.service.len() - 1
                }
            };
            let instances = &mut document.service[index].service_endpoint.instances;
            for endpoint in endpoints {
                if !instances.contains(endpoint) {
                    instances.push(endpoint.clone());
                }
            }
        }
        Patch::RemoveServiceEndpoints {
            service_type,
            endpoints,
        } => {
            if let Some(service) = document
                .service
                .iter_mut()
                .find(|s| s.service_type == *service_type)
            {
                service
                    .service_endpoint
                    .instances
                    .retain(|i| !endpoints.contains(i));
            }
        }
        Patch::Unknown => {}
    }
}
