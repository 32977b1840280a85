use rand::Rng;

pub const DEFAULT_PREFIX: &str = "TKT";
pub const DEFAULT_LENGTH: usize = 6;

/// Uppercase letters and digits; suffix characters are drawn from here.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mint an escalation ticket id of the form `<prefix>-<suffix>`.
///
/// Uniqueness is human-facing only: collisions are possible and accepted.
pub fn new_ticket_id(prefix: &str, length: usize) -> String {
    new_ticket_id_with(&mut rand::thread_rng(), prefix, length)
}

/// Same as [`new_ticket_id`] but draws from the given random source.
pub fn new_ticket_id_with<R: Rng>(rng: &mut R, prefix: &str, length: usize) -> String {
    let suffix: String = (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{prefix}-{suffix}")
}
