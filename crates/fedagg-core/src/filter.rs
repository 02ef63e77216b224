//! Role and protocol filters selected by named tokens.

use std::collections::{BTreeMap, BTreeSet};

use fedagg_metadata::{EntityDescriptor, RoleKind};
use fedagg_types::{PROTOCOL_SAML11, PROTOCOL_SAML2};

const ALL_ROLES: [RoleKind; 3] = [
    RoleKind::IdentityProvider,
    RoleKind::ServiceProvider,
    RoleKind::AttributeAuthority,
];

/// Two inclusion maps, one keyed by protocol and one by role kind.
///
/// The empty set (no tokens ever applied) lets every entity through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    protocols: BTreeMap<&'static str, bool>,
    roles: BTreeMap<RoleKind, bool>,
}

impl FilterSet {
    /// Builds the maps from filter tokens.
    ///
    /// Recognized tokens are `saml2`, `saml20-idp`, `saml20-sp`, `saml20-aa`
    /// and their SAML 1.1 counterparts `shib13`, `shib13-idp`, `shib13-sp`,
    /// `shib13-aa`. Unknown tokens enable nothing. Returns `None` for an
    /// empty token list.
    pub fn from_tokens<I, S>(tokens: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: BTreeSet<String> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let mut set = Self {
            protocols: [PROTOCOL_SAML2, PROTOCOL_SAML11]
                .into_iter()
                .map(|p| (p, false))
                .collect(),
            roles: ALL_ROLES.into_iter().map(|r| (r, false)).collect(),
        };
        for token in &tokens {
            let Some((protocol, roles)) = token_implies(token) else {
                tracing::debug!(token = %token, "ignoring unknown filter token");
                continue;
            };
            set.protocols.insert(protocol, true);
            for role in roles {
                set.roles.insert(role, true);
            }
        }
        Some(set)
    }

    /// True when no filter has been configured.
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty() || self.roles.is_empty()
    }

    /// True when one role of `entity` is enabled and speaks an enabled protocol.
    pub fn accepts(&self, entity: &EntityDescriptor) -> bool {
        if self.is_empty() {
            return true;
        }
        entity.roles.iter().any(|role| {
            self.roles.get(&role.kind).copied().unwrap_or(false)
                && role
                    .protocols
                    .iter()
                    .any(|p| self.protocols.get(p.as_str()).copied().unwrap_or(false))
        })
    }

    /// Stable textual form used in cache keys.
    pub fn canonical(&self) -> String {
        let protocols = self
            .protocols
            .iter()
            .map(|(p, on)| format!("{p}={}", u8::from(*on)));
        let roles = self
            .roles
            .iter()
            .map(|(r, on)| format!("{}={}", role_label(r), u8::from(*on)));
        protocols.chain(roles).collect::<Vec<_>>().join(",")
    }
}

fn token_implies(token: &str) -> Option<(&'static str, Vec<RoleKind>)> {
    let (protocol, role) = match token {
        "saml2" => (PROTOCOL_SAML2, None),
        "saml20-idp" => (PROTOCOL_SAML2, Some(RoleKind::IdentityProvider)),
        "saml20-sp" => (PROTOCOL_SAML2, Some(RoleKind::ServiceProvider)),
        "saml20-aa" => (PROTOCOL_SAML2, Some(RoleKind::AttributeAuthority)),
        "shib13" => (PROTOCOL_SAML11, None),
        "shib13-idp" => (PROTOCOL_SAML11, Some(RoleKind::IdentityProvider)),
        "shib13-sp" => (PROTOCOL_SAML11, Some(RoleKind::ServiceProvider)),
        "shib13-aa" => (PROTOCOL_SAML11, Some(RoleKind::AttributeAuthority)),
        _ => return None,
    };
    let roles = match role {
        Some(role) => vec![role],
        None => ALL_ROLES.to_vec(),
    };
    Some((protocol, roles))
}

fn role_label(kind: &RoleKind) -> &str {
    match kind {
        RoleKind::IdentityProvider => "idp",
        RoleKind::ServiceProvider => "sp",
        RoleKind::AttributeAuthority => "aa",
        RoleKind::Other(name) => name,
    }
}
