//! Signing secret generation for webhook registrations.

use rand::RngCore;

/// Prefix identifying webhook signing secrets.
pub const SECRET_PREFIX: &str = "whsec_";

/// Number of random bytes behind each secret.
const SECRET_BYTES: usize = 32;

/// Generates a fresh signing secret.
///
/// 32 bytes from the OS-seeded generator, hex encoded behind the
/// `whsec_` prefix. Secrets are never derived from webhook attributes,
/// so re-registering the same URL yields a different secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}
