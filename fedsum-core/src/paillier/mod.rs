//! Additively homomorphic encryption of flat weight vectors.
//!
//! The scheme is Paillier with the conventional generator `g = n + 1`, so
//! that decryption only needs the totient and the modulus. Ciphertext
//! vectors of equal length can be combined component-wise; decrypting the
//! combination yields the sum of the plaintexts modulo `n`.
//!
//! Key material is always passed explicitly. There is no process-global
//! key state, and two keypairs never interoperate: a ciphertext is only
//! meaningful under the modulus it was produced with.

pub(crate) mod prime;
pub(crate) mod serialization;

use derive_more::{From, Index, Into};
use num::{
    bigint::{BigInt, BigUint},
    traits::{One, Zero},
    Integer,
};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

pub use self::serialization::WireFormatError;
use self::prime::{generate_prime, random_below};

/// A Paillier keypair.
///
/// `phi` is the private part; `g` and `n` together form the public key
/// that projects distribute to their participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// The public modulus `n = p * q`.
    pub n: BigUint,
    /// The public generator, fixed to `n + 1`.
    pub g: BigUint,
    /// The private totient `(p - 1) * (q - 1)`.
    pub phi: BigUint,
}

/// A vector of Paillier ciphertexts, one per model weight.
///
/// All components live in `[0, n^2)` for the modulus of the keypair that
/// produced them. On the wire this serializes to the pipe-delimited
/// decimal form handled by the [`serialization`] module.
#[derive(Debug, Clone, PartialEq, Eq, From, Into, Index)]
pub struct EncryptedVector(Vec<BigUint>);

impl EncryptedVector {
    /// The number of encrypted components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the ciphertext components.
    pub fn iter(&self) -> std::slice::Iter<'_, BigUint> {
        self.0.iter()
    }
}

/// Errors related to keypair generation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyGenerationError {
    #[error("the requested modulus width is too small")]
    ModulusTooSmall,

    #[error("no prime found within the retry budget")]
    PrimeSearchExhausted,
}

/// Errors related to encrypting a scaled weight vector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("plaintext component {index} is outside the plaintext domain")]
    PlaintextOutOfRange { index: usize },
}

/// Errors related to decrypting a ciphertext vector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("the totient is not invertible modulo n")]
    InvalidKey,

    #[error("ciphertext component {index} is outside the ciphertext domain")]
    CiphertextOutOfRange { index: usize },

    #[error("ciphertext component {index} is not a valid encryption under this key")]
    MalformedCiphertext { index: usize },
}

/// Errors related to combining ciphertext vectors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeMismatchError {
    #[error("cannot combine an empty set of ciphertext vectors")]
    Empty,

    #[error("ciphertext vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Generates a fresh keypair with a modulus of roughly `bits` bits.
///
/// Both prime factors are drawn at `bits / 2`; the search for each is
/// bounded, so generation can fail instead of spinning forever on a bad
/// entropy source.
pub fn generate_keypair(bits: u64, prng: &mut ChaCha20Rng) -> Result<KeyPair, KeyGenerationError> {
    let half = bits / 2;
    let p = generate_prime(half, prng)?;
    let mut q = generate_prime(half, prng)?;
    while q == p {
        q = generate_prime(half, prng)?;
    }
    let n = &p * &q;
    let g = &n + BigUint::one();
    let phi = (p - BigUint::one()) * (q - BigUint::one());
    Ok(KeyPair { n, g, phi })
}

/// Encrypts a scaled weight vector component-wise.
///
/// Every component gets its own blinding factor, so encrypting the same
/// plaintext twice yields different ciphertexts.
///
/// # Errors
/// Fails if any plaintext component is `>= n`.
pub fn encrypt(
    plaintexts: &[BigUint],
    g: &BigUint,
    n: &BigUint,
    prng: &mut ChaCha20Rng,
) -> Result<EncryptedVector, EncryptionError> {
    let n_squared = n * n;
    let mut ciphertexts = Vec::with_capacity(plaintexts.len());
    for (index, m) in plaintexts.iter().enumerate() {
        if m >= n {
            return Err(EncryptionError::PlaintextOutOfRange { index });
        }
        let r = random_coprime(n, prng);
        let c = (g.modpow(m, &n_squared) * r.modpow(n, &n_squared)) % &n_squared;
        ciphertexts.push(c);
    }
    Ok(EncryptedVector(ciphertexts))
}

/// Combines ciphertext vectors into the encryption of their component-wise
/// plaintext sum.
///
/// The product of two ciphertexts modulo `n^2` encrypts the sum of the two
/// plaintexts; folding the whole batch yields the encrypted aggregate
/// without ever exposing an individual contribution.
///
/// # Errors
/// Fails on an empty batch or on vectors of differing length.
pub fn homomorphic_add(
    vectors: &[EncryptedVector],
    n: &BigUint,
) -> Result<EncryptedVector, ShapeMismatchError> {
    let (first, rest) = vectors.split_first().ok_or(ShapeMismatchError::Empty)?;
    let n_squared = n * n;
    let mut combined = first.0.clone();
    for vector in rest {
        if vector.len() != combined.len() {
            return Err(ShapeMismatchError::LengthMismatch {
                expected: combined.len(),
                actual: vector.len(),
            });
        }
        for (acc, c) in combined.iter_mut().zip(vector.iter()) {
            *acc = (&*acc * c) % &n_squared;
        }
    }
    Ok(EncryptedVector(combined))
}

/// Decrypts a ciphertext vector back into scaled plaintext sums.
///
/// With `g = n + 1` the plaintext is recovered as
/// `L(c^phi mod n^2) * phi^-1 mod n` where `L(u) = (u - 1) / n`.
///
/// # Errors
/// Fails if `phi` is not invertible modulo `n`, or if any component is
/// zero, `>= n^2`, or not a residue this key could have produced.
pub fn decrypt(
    ciphertexts: &EncryptedVector,
    phi: &BigUint,
    n: &BigUint,
) -> Result<Vec<BigUint>, DecryptionError> {
    let phi_inverse = modular_inverse(phi, n).ok_or(DecryptionError::InvalidKey)?;
    let n_squared = n * n;
    let mut plaintexts = Vec::with_capacity(ciphertexts.len());
    for (index, c) in ciphertexts.iter().enumerate() {
        if c.is_zero() || c >= &n_squared {
            return Err(DecryptionError::CiphertextOutOfRange { index });
        }
        let u = c.modpow(phi, &n_squared);
        // u == 1 + m * phi * n for a well-formed ciphertext
        let shifted = u - BigUint::one();
        if !(&shifted % n).is_zero() {
            return Err(DecryptionError::MalformedCiphertext { index });
        }
        let m = ((shifted / n) * &phi_inverse) % n;
        plaintexts.push(m);
    }
    Ok(plaintexts)
}

// Draws a blinding factor from [1, n). For an honestly generated modulus a
// non-zero draw is coprime to n with overwhelming probability.
fn random_coprime(n: &BigUint, prng: &mut ChaCha20Rng) -> BigUint {
    loop {
        let r = random_below(prng, n);
        if !r.is_zero() && r.gcd(n).is_one() {
            return r;
        }
    }
}

fn modular_inverse(value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let value = BigInt::from(value.clone());
    let modulus = BigInt::from(modulus.clone());
    let extended = value.extended_gcd(&modulus);
    if !extended.gcd.is_one() {
        return None;
    }
    let inverse = ((extended.x % &modulus) + &modulus) % &modulus;
    inverse.to_biguint()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    // 10007 and 10009 are both prime
    fn small_keypair() -> KeyPair {
        let p = BigUint::from(10_007_u64);
        let q = BigUint::from(10_009_u64);
        let n = &p * &q;
        let g = &n + BigUint::one();
        let phi = (p - BigUint::one()) * (q - BigUint::one());
        KeyPair { n, g, phi }
    }

    fn plaintexts(values: &[u64]) -> Vec<BigUint> {
        values.iter().map(|&v| BigUint::from(v)).collect()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([11_u8; 32]);
        let messages = plaintexts(&[0, 1, 10_000, 22_000]);

        let encrypted = encrypt(&messages, &keys.g, &keys.n, &mut prng).unwrap();
        let decrypted = decrypt(&encrypted, &keys.phi, &keys.n).unwrap();
        assert_eq!(decrypted, messages);
    }

    #[test]
    fn test_encryption_is_randomized() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([12_u8; 32]);
        let messages = plaintexts(&[42]);

        let first = encrypt(&messages, &keys.g, &keys.n, &mut prng).unwrap();
        let second = encrypt(&messages, &keys.g, &keys.n, &mut prng).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            decrypt(&first, &keys.phi, &keys.n).unwrap(),
            decrypt(&second, &keys.phi, &keys.n).unwrap(),
        );
    }

    #[test]
    fn test_homomorphic_sum() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([13_u8; 32]);

        let first = encrypt(&plaintexts(&[1000, 2000, 3000]), &keys.g, &keys.n, &mut prng).unwrap();
        let second =
            encrypt(&plaintexts(&[1000, 2000, 3000]), &keys.g, &keys.n, &mut prng).unwrap();

        let combined = homomorphic_add(&[first, second], &keys.n).unwrap();
        let decrypted = decrypt(&combined, &keys.phi, &keys.n).unwrap();
        assert_eq!(decrypted, plaintexts(&[2000, 4000, 6000]));
    }

    #[test]
    fn test_homomorphic_add_is_commutative() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([14_u8; 32]);

        let a = encrypt(&plaintexts(&[7, 8]), &keys.g, &keys.n, &mut prng).unwrap();
        let b = encrypt(&plaintexts(&[100, 200]), &keys.g, &keys.n, &mut prng).unwrap();

        let ab = homomorphic_add(&[a.clone(), b.clone()], &keys.n).unwrap();
        let ba = homomorphic_add(&[b, a], &keys.n).unwrap();
        assert_eq!(
            decrypt(&ab, &keys.phi, &keys.n).unwrap(),
            decrypt(&ba, &keys.phi, &keys.n).unwrap(),
        );
    }

    #[test]
    fn test_homomorphic_add_rejects_mismatched_lengths() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([15_u8; 32]);

        let short = encrypt(&plaintexts(&[1]), &keys.g, &keys.n, &mut prng).unwrap();
        let long = encrypt(&plaintexts(&[1, 2]), &keys.g, &keys.n, &mut prng).unwrap();

        assert_eq!(
            homomorphic_add(&[short, long], &keys.n),
            Err(ShapeMismatchError::LengthMismatch {
                expected: 1,
                actual: 2
            }),
        );
        assert_eq!(homomorphic_add(&[], &keys.n), Err(ShapeMismatchError::Empty));
    }

    #[test]
    fn test_encrypt_rejects_plaintext_outside_domain() {
        let keys = small_keypair();
        let mut prng = ChaCha20Rng::from_seed([16_u8; 32]);

        let oversized = vec![BigUint::from(0_u64), keys.n.clone()];
        assert_eq!(
            encrypt(&oversized, &keys.g, &keys.n, &mut prng),
            Err(EncryptionError::PlaintextOutOfRange { index: 1 }),
        );
    }

    #[test]
    fn test_decrypt_rejects_out_of_domain_ciphertexts() {
        let keys = small_keypair();
        let zero = EncryptedVector(vec![BigUint::from(0_u64)]);
        assert_eq!(
            decrypt(&zero, &keys.phi, &keys.n),
            Err(DecryptionError::CiphertextOutOfRange { index: 0 }),
        );

        let oversized = EncryptedVector(vec![&keys.n * &keys.n]);
        assert_eq!(
            decrypt(&oversized, &keys.phi, &keys.n),
            Err(DecryptionError::CiphertextOutOfRange { index: 0 }),
        );
    }

    #[test]
    fn test_generate_keypair_is_deterministic_per_seed() {
        let first = generate_keypair(64, &mut ChaCha20Rng::from_seed([21_u8; 32])).unwrap();
        let second = generate_keypair(64, &mut ChaCha20Rng::from_seed([21_u8; 32])).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.g, &first.n + BigUint::one());
    }

    #[test]
    fn test_generated_keypair_round_trips() {
        let mut prng = ChaCha20Rng::from_seed([22_u8; 32]);
        let keys = generate_keypair(64, &mut prng).unwrap();

        let messages = plaintexts(&[0, 12_345, 999_999]);
        let encrypted = encrypt(&messages, &keys.g, &keys.n, &mut prng).unwrap();
        assert_eq!(decrypt(&encrypted, &keys.phi, &keys.n).unwrap(), messages);
    }
}
