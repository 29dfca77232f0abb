//! Probabilistic prime generation for keypair creation.
//!
//! Candidates are drawn from a `ChaCha20` CSPRNG and filtered by trial
//! division against a small-prime table before running Miller-Rabin.

use num::{
    bigint::BigUint,
    traits::{One, Zero},
    Integer,
};
use rand::RngCore;
use rand_chacha::ChaCha20Rng;

use crate::paillier::KeyGenerationError;

/// Miller-Rabin rounds; error probability is at most `4^-ROUNDS`.
const MILLER_RABIN_ROUNDS: usize = 40;

/// How many candidates to try before giving up on a prime search.
const CANDIDATE_BUDGET: usize = 50_000;

const SMALL_PRIMES: [u32; 30] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113,
];

/// Draws a uniform integer from `[0, max_int)`.
pub(crate) fn random_below(prng: &mut ChaCha20Rng, max_int: &BigUint) -> BigUint {
    if max_int.is_zero() {
        return BigUint::zero();
    }
    let mut bytes = max_int.to_bytes_le();
    let mut candidate = max_int.clone();
    while &candidate >= max_int {
        prng.fill_bytes(&mut bytes);
        candidate = BigUint::from_bytes_le(&bytes);
    }
    candidate
}

/// Searches for a prime of exactly `bits` bits.
///
/// # Errors
/// Fails with [`KeyGenerationError::PrimeSearchExhausted`] if no candidate
/// passes the primality test within the retry budget.
pub(crate) fn generate_prime(
    bits: u64,
    prng: &mut ChaCha20Rng,
) -> Result<BigUint, KeyGenerationError> {
    if bits < 8 {
        return Err(KeyGenerationError::ModulusTooSmall);
    }
    let span = BigUint::one() << (bits - 1);
    for _ in 0..CANDIDATE_BUDGET {
        // top bit set for exact width, bottom bit set for oddness
        let mut candidate = random_below(prng, &span) | &span;
        candidate |= BigUint::one();
        if is_prime(&candidate, prng) {
            return Ok(candidate);
        }
    }
    Err(KeyGenerationError::PrimeSearchExhausted)
}

pub(crate) fn is_prime(candidate: &BigUint, prng: &mut ChaCha20Rng) -> bool {
    if candidate < &BigUint::from(2_u8) {
        return false;
    }
    for &small in SMALL_PRIMES.iter() {
        let small = BigUint::from(small);
        if candidate == &small {
            return true;
        }
        if (candidate % &small).is_zero() {
            return false;
        }
    }
    miller_rabin(candidate, prng)
}

// Miller-Rabin with random bases. `candidate` is odd and coprime to the
// small-prime table at this point.
fn miller_rabin(candidate: &BigUint, prng: &mut ChaCha20Rng) -> bool {
    let one = BigUint::one();
    let two = &one + &one;
    let minus_one = candidate - &one;

    // candidate - 1 == 2^s * d with d odd
    let mut d = minus_one.clone();
    let mut s = 0_u64;
    while d.is_even() {
        d >>= 1_usize;
        s += 1;
    }

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let base = random_below(prng, &(&minus_one - &two)) + &two;
        let mut x = base.modpow(&d, candidate);
        if x == one || x == minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = x.modpow(&two, candidate);
            if x == minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}
