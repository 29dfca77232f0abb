use std::process;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use structopt::StructOpt;

use fedsum_core::paillier::generate_keypair;

/// Generates a Paillier keypair and prints it as `phi|g|n`.
///
/// The `g` and `n` components form the public key a project is registered
/// with; `phi` is the private key and must stay with the participants.
#[derive(Debug, StructOpt)]
#[structopt(name = "Keygen")]
struct Opt {
    /// Width of the modulus in bits
    #[structopt(short, long, default_value = "2048")]
    bits: u64,
}

fn main() {
    let opt = Opt::from_args();

    let mut prng = ChaCha20Rng::from_entropy();
    let keypair = generate_keypair(opt.bits, &mut prng).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    println!("{}", keypair);
}
