//! Origins and the policy that decides which senders are trusted.
//!
//! An origin is the `scheme://host[:port]` triple of a URL. A popup
//! message is only trustworthy when the origin the host attaches to it
//! matches the origin the popup was opened at.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ProtocolError;

/// A serialized, tuple-form web origin such as `https://auth.example.com`.
///
/// Always stored in the canonical ASCII serialization produced by the
/// `url` crate, so two `Origin`s compare equal exactly when a browser
/// would consider them same-origin (default ports are elided, hosts are
/// lowercased and punycoded).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parses an origin from either a bare origin or a full URL.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidOrigin`] if the string is not a URL
    /// or its origin is opaque.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let url = Url::parse(input)
            .map_err(|e| ProtocolError::InvalidOrigin(format!("{input}: {e}")))?;
        Self::of_url(&url)
    }

    /// Returns the origin of an already-parsed URL.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidOrigin`] for URLs with an opaque
    /// origin.
    pub fn of_url(url: &Url) -> Result<Self, ProtocolError> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(ProtocolError::InvalidOrigin(format!(
                "{url} has an opaque origin"
            )));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Origin {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

// ---------------------------------------------------------------------------
// OriginPolicy
// ---------------------------------------------------------------------------

/// Which sender origins a message channel accepts.
///
/// `PopupUrl` is what sessions use unless told otherwise: the origin of the
/// URL the popup was opened at. Deployments where the provider finishes
/// on a sibling subdomain list those explicitly with `AllowList`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Accept only the origin the popup was opened at.
    #[default]
    PopupUrl,

    /// Accept exactly this origin.
    Exact(Origin),

    /// Accept any origin in the list.
    AllowList(Vec<Origin>),

    /// Accept every origin. Leaves the channel open to any window that
    /// can reach the opener; only meant for local development.
    Any,
}

impl OriginPolicy {
    /// Resolves `PopupUrl` against the origin the popup was opened at,
    /// leaving every other policy untouched.
    pub fn resolve(self, popup_origin: &Origin) -> Self {
        match self {
            Self::PopupUrl => Self::Exact(popup_origin.clone()),
            other => other,
        }
    }

    /// Returns `true` if a message from `origin` may be classified.
    ///
    /// An unresolved `PopupUrl` policy has nothing to compare against
    /// and rejects everything.
    pub fn allows(&self, origin: &Origin) -> bool {
        match self {
            Self::PopupUrl => false,
            Self::Exact(expected) => expected == origin,
            Self::AllowList(list) => list.contains(origin),
            Self::Any => true,
        }
    }

    /// `true` for the policy that performs no validation at all.
    pub fn is_permissive(&self) -> bool {
        matches!(self, Self::Any)
    }
}
