use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Development placeholder salt. The server logs a warning at startup while
/// this value is in effect.
pub const DEFAULT_SALT: &str = "default-salt-change-in-production";

/// Keyed digest of an access password: HMAC-SHA256 under the server-wide
/// salt, hex-encoded. Identical passwords under the same salt produce
/// identical digests.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC accepts any key length");
    mac.update(password.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a candidate password against a stored digest.
pub fn verify_password(password: &str, salt: &str, expected: &str) -> bool {
    let computed = hash_password(password, salt);
    constant_time_eq(computed.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = hash_password("hunter2", "salt");
        let b = hash_password("hunter2", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // sha256 hex
    }

    #[test]
    fn digest_depends_on_salt_and_password() {
        let base = hash_password("hunter2", "salt-a");
        assert_ne!(base, hash_password("hunter2", "salt-b"));
        assert_ne!(base, hash_password("hunter3", "salt-a"));
    }

    #[test]
    fn verify_accepts_the_right_password_only() {
        let digest = hash_password("opensesame", DEFAULT_SALT);
        assert!(verify_password("opensesame", DEFAULT_SALT, &digest));
        assert!(!verify_password("opensesame!", DEFAULT_SALT, &digest));
        assert!(!verify_password("opensesame", "other-salt", &digest));
    }
}
