use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over `parts`, each terminated by a NUL byte so that
/// part boundaries cannot shift between inputs.
pub fn sha256_hex<I, T>(parts: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_matter() {
        assert_ne!(sha256_hex(["ab", "c"]), sha256_hex(["a", "bc"]));
        assert_eq!(sha256_hex(["x"]), sha256_hex(vec!["x".to_string()]));
        assert_eq!(sha256_hex(["x"]).len(), 64);
    }
}
