use sha2::{Digest, Sha256};

/// Salted SHA-256 over IP and user agent, hex encoded. Used only as a
/// grouping key for unique-visitor counting.
pub fn fingerprint(ip: &str, user_agent: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("203.0.113.7", "Mozilla/5.0", "salt");
        let b = fingerprint("203.0.113.7", "Mozilla/5.0", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_inputs() {
        let base = fingerprint("203.0.113.7", "Mozilla/5.0", "salt");
        assert_ne!(base, fingerprint("203.0.113.8", "Mozilla/5.0", "salt"));
        assert_ne!(base, fingerprint("203.0.113.7", "Mozilla/5.1", "salt"));
        assert_ne!(base, fingerprint("203.0.113.7", "Mozilla/5.0", "pepper"));
    }
}
