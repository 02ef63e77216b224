//! Enveloped signature creation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fedagg_metadata::{root_scope, XmlElement};
use fedagg_types::NS_DSIG;

use crate::algorithm::{DigestAlgorithm, SignatureAlgorithm};
use crate::c14n::{canonicalize, Canonicalization};
use crate::error::XmlSecError;
use crate::keys::{SigningKey, X509Certificate};
use crate::ENVELOPED_SIGNATURE;

const DS: &str = "ds";

/// Signs `root` in place with an enveloped signature.
///
/// The root gets an `ID` attribute if it has none, any existing signature
/// is replaced, and the new `ds:Signature` becomes the root's first child.
/// The reference uses the enveloped-signature and exclusive c14n transforms
/// with a SHA-256 digest. When `certificate` is given it is embedded in
/// `ds:KeyInfo`.
///
/// # Errors
///
/// Returns `XmlSecError::Signing` if the RSA operation fails.
pub fn sign_enveloped(
    root: &mut XmlElement,
    key: &SigningKey,
    algorithm: SignatureAlgorithm,
    certificate: Option<&X509Certificate>,
) -> Result<(), XmlSecError> {
    let id = match root.attribute("ID") {
        Some(id) => id.to_string(),
        None => {
            let id = format!("_{}", uuid::Uuid::new_v4().simple());
            root.set_attribute("ID", id.clone());
            id
        }
    };
    root.remove_children(NS_DSIG, "Signature");

    let c14n = Canonicalization::exclusive();
    let digest_algorithm = DigestAlgorithm::Sha256;
    let digest = digest_algorithm.digest(canonicalize(root, &root_scope(), &c14n).as_bytes());

    let signed_info = build_signed_info(&id, algorithm, digest_algorithm, &digest);
    let mut signature = ds("Signature");
    signature.declare_namespace(Some(DS), NS_DSIG);

    let inherited = signature.scope_within(&root.scope_within(&root_scope()));
    let canonical_info = canonicalize(&signed_info, &inherited, &c14n);
    let value = key.sign(algorithm, canonical_info.as_bytes())?;

    signature.push_element(signed_info);
    let mut signature_value = ds("SignatureValue");
    signature_value.push_text(STANDARD.encode(value));
    signature.push_element(signature_value);

    if let Some(cert) = certificate {
        let mut x509 = ds("X509Certificate");
        x509.push_text(cert.to_base64());
        let mut data = ds("X509Data");
        data.push_element(x509);
        let mut key_info = ds("KeyInfo");
        key_info.push_element(data);
        signature.push_element(key_info);
    }

    root.children
        .insert(0, fedagg_metadata::XmlNode::Element(signature));
    tracing::debug!(id = %id, algorithm = algorithm.uri(), "signed metadata document");
    Ok(())
}

fn build_signed_info(
    id: &str,
    algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    digest: &[u8],
) -> XmlElement {
    let mut transforms = ds("Transforms");
    transforms.push_element(ds("Transform").with_attribute("Algorithm", ENVELOPED_SIGNATURE));
    transforms.push_element(
        ds("Transform").with_attribute("Algorithm", Canonicalization::exclusive().uri()),
    );

    let mut digest_value = ds("DigestValue");
    digest_value.push_text(STANDARD.encode(digest));

    let mut reference = ds("Reference").with_attribute("URI", format!("#{id}"));
    reference.push_element(transforms);
    reference.push_element(ds("DigestMethod").with_attribute("Algorithm", digest_algorithm.uri()));
    reference.push_element(digest_value);

    let mut signed_info = ds("SignedInfo");
    signed_info.push_element(
        ds("CanonicalizationMethod")
            .with_attribute("Algorithm", Canonicalization::exclusive().uri()),
    );
    signed_info.push_element(ds("SignatureMethod").with_attribute("Algorithm", algorithm.uri()));
    signed_info.push_element(reference);
    signed_info
}

fn ds(local_name: &str) -> XmlElement {
    XmlElement::new(Some(DS), local_name, Some(NS_DSIG))
}
