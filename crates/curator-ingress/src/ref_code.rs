//! Referral code generation.

use curator_types::constants::REF_CODE_ALPHABET;
use curator_types::RefCode;
use rand::Rng;

/// Random code of `len` characters drawn from [`REF_CODE_ALPHABET`].
///
/// Uniqueness is not checked here; the store rejects collisions on insert.
#[must_use]
pub fn generate_ref_code(len: usize) -> RefCode {
    let mut rng = rand::thread_rng();
    let code: String = (0..len)
        .map(|_| char::from(REF_CODE_ALPHABET[rng.gen_range(0..REF_CODE_ALPHABET.len())]))
        .collect();
    RefCode::new(code)
}
