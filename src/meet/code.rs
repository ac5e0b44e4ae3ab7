use rand::Rng;

/// Alphabet for meet codes: digits plus upper/lowercase ASCII letters.
const CODE_ALPHABET: &[u8] = b"1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random meet code of `length` symbols. At the default
/// length of 9 over a 62-symbol alphabet that is ~53 bits of entropy,
/// so collisions are left to the store's unique constraint to catch.
pub fn generate_meet_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
