//! Local-user password hashing: PBKDF2-HMAC-SHA256, 600,000 iterations, a
//! 32-byte hash and 16-byte salt (§3).

use ludwig_types::{PASSWORD_HASH_ITERATIONS, PASSWORD_HASH_LEN, PASSWORD_SALT_LEN};
use rand::RngCore as _;

pub fn generate_salt() -> [u8; PASSWORD_SALT_LEN] {
    let mut salt = [0u8; PASSWORD_SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

pub fn hash_password(password: &str, salt: &[u8; PASSWORD_SALT_LEN]) -> [u8; PASSWORD_HASH_LEN] {
    let mut out = [0u8; PASSWORD_HASH_LEN];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
        password.as_bytes(),
        salt,
        PASSWORD_HASH_ITERATIONS,
        &mut out,
    );
    out
}

pub fn verify_password(
    password: &str,
    salt: &[u8; PASSWORD_SALT_LEN],
    expected_hash: &[u8; PASSWORD_HASH_LEN],
) -> bool {
    use subtle_const_time_eq::const_time_eq;
    const_time_eq(&hash_password(password, salt), expected_hash)
}

/// Constant-time byte comparison, to avoid leaking hash-match information
/// through a timing side channel on login attempts.
mod subtle_const_time_eq {
    pub fn const_time_eq(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            diff |= x ^ y;
        }
        diff == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_given_same_salt() {
        let salt = generate_salt();
        let h1 = hash_password("Passw0rd!", &salt);
        let h2 = hash_password("Passw0rd!", &salt);
        assert_eq!(h1, h2);
    }

    #[test]
    fn verify_accepts_correct_password_and_rejects_wrong_one() {
        let salt = generate_salt();
        let hash = hash_password("Passw0rd!", &salt);
        assert!(verify_password("Passw0rd!", &salt, &hash));
        assert!(!verify_password("wrong", &salt, &hash));
    }
}
