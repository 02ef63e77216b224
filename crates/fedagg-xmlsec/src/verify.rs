//! Enveloped signature verification against trusted keys.
//!
//! Only the keys passed in are trusted. Certificates embedded in the
//! document's `ds:KeyInfo` are ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fedagg_metadata::{root_scope, XmlElement};
use fedagg_types::NS_DSIG;
use rsa::RsaPublicKey;

use crate::algorithm::{DigestAlgorithm, SignatureAlgorithm};
use crate::c14n::{canonicalize, Canonicalization};
use crate::error::XmlSecError;
use crate::keys::verify_signature;
use crate::ENVELOPED_SIGNATURE;

const NS_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Returns true when `root` carries an enveloped `ds:Signature`.
pub fn is_signed(root: &XmlElement) -> bool {
    root.find_child(NS_DSIG, "Signature").is_some()
}

/// Verifies the enveloped signature on `root` against any of `keys`.
///
/// The signature must reference the whole document, either with an empty
/// URI or with `#` and the root's ID, and must use the enveloped-signature
/// transform.
///
/// # Errors
///
/// Returns `XmlSecError::MissingSignature` for unsigned documents,
/// `XmlSecError::Malformed` or `XmlSecError::UnsupportedAlgorithm` for
/// signatures this verifier cannot process, `XmlSecError::DigestMismatch`
/// when the content changed, and `XmlSecError::InvalidSignature` when no key
/// verifies the signature value.
pub fn verify_enveloped(root: &XmlElement, keys: &[RsaPublicKey]) -> Result<(), XmlSecError> {
    let signature = root
        .find_child(NS_DSIG, "Signature")
        .ok_or(XmlSecError::MissingSignature)?;
    let signed_info = required(signature, "SignedInfo")?;

    let c14n_method = required(signed_info, "CanonicalizationMethod")?;
    let c14n = Canonicalization::from_uri(algorithm_of(c14n_method)?, inclusive_prefixes(c14n_method))?;
    let algorithm = SignatureAlgorithm::parse(algorithm_of(required(signed_info, "SignatureMethod")?)?)?;

    let references: Vec<&XmlElement> = signed_info
        .child_elements()
        .filter(|e| e.is(NS_DSIG, "Reference"))
        .collect();
    let [reference] = references.as_slice() else {
        return Err(XmlSecError::Malformed(format!(
            "expected exactly one reference, found {}",
            references.len()
        )));
    };
    check_reference(root, reference)?;

    let value = STANDARD
        .decode(strip_whitespace(&required(signature, "SignatureValue")?.text()))
        .map_err(|e| XmlSecError::Malformed(format!("signature value: {e}")))?;

    let inherited = signature.scope_within(&root.scope_within(&root_scope()));
    let canonical_info = canonicalize(signed_info, &inherited, &c14n);

    if keys
        .iter()
        .any(|key| verify_signature(key, algorithm, canonical_info.as_bytes(), &value))
    {
        Ok(())
    } else {
        Err(XmlSecError::InvalidSignature)
    }
}

fn check_reference(root: &XmlElement, reference: &XmlElement) -> Result<(), XmlSecError> {
    let uri = reference.attribute("URI").unwrap_or_default();
    if !uri.is_empty() {
        let root_id = ["ID", "Id", "id"]
            .iter()
            .find_map(|name| root.attribute(name));
        let target = uri.strip_prefix('#');
        if target.is_none() || target != root_id {
            return Err(XmlSecError::Malformed(format!(
                "reference '{uri}' does not point at the document element"
            )));
        }
    }

    let mut enveloped = false;
    let mut c14n = Canonicalization::Inclusive {
        with_comments: false,
    };
    if let Some(transforms) = reference.find_child(NS_DSIG, "Transforms") {
        for transform in transforms.child_elements().filter(|e| e.is(NS_DSIG, "Transform")) {
            let algorithm = algorithm_of(transform)?;
            if algorithm == ENVELOPED_SIGNATURE {
                enveloped = true;
            } else if Canonicalization::is_canonicalization_uri(algorithm) {
                c14n = Canonicalization::from_uri(algorithm, inclusive_prefixes(transform))?;
            } else {
                return Err(XmlSecError::UnsupportedAlgorithm(algorithm.to_string()));
            }
        }
    }
    if !enveloped {
        return Err(XmlSecError::Malformed(
            "reference lacks the enveloped-signature transform".to_string(),
        ));
    }

    let digest_algorithm = DigestAlgorithm::from_uri(algorithm_of(required(reference, "DigestMethod")?)?)?;
    let expected = STANDARD
        .decode(strip_whitespace(&required(reference, "DigestValue")?.text()))
        .map_err(|e| XmlSecError::Malformed(format!("digest value: {e}")))?;

    let mut content = root.clone();
    content.remove_children(NS_DSIG, "Signature");
    let actual = digest_algorithm.digest(canonicalize(&content, &root_scope(), &c14n).as_bytes());
    if actual != expected {
        return Err(XmlSecError::DigestMismatch(uri.to_string()));
    }
    Ok(())
}

fn required<'a>(parent: &'a XmlElement, local_name: &str) -> Result<&'a XmlElement, XmlSecError> {
    parent
        .find_child(NS_DSIG, local_name)
        .ok_or_else(|| XmlSecError::Malformed(format!("missing ds:{local_name}")))
}

fn algorithm_of(element: &XmlElement) -> Result<&str, XmlSecError> {
    element.attribute("Algorithm").ok_or_else(|| {
        XmlSecError::Malformed(format!("{} has no Algorithm", element.qualified_name()))
    })
}

fn inclusive_prefixes(element: &XmlElement) -> Vec<String> {
    element
        .find_child(NS_EXC_C14N, "InclusiveNamespaces")
        .and_then(|e| e.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
