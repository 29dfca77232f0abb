//! # Fedsum core
//!
//! Pure computation layer of the Fedsum federated-learning coordinator.
//!
//! Participants of a training project train locally and submit their model
//! parameters encrypted under the project's public key. The coordinator sums
//! the ciphertexts without ever decrypting them and republishes the encrypted
//! aggregate as the next round's global model. This crate provides the two
//! building blocks that make this possible:
//!
//! - [`model`]: a typed representation of nested model parameters, the
//!   flatten/restore codec between that representation and a flat weight
//!   vector plus a [`ShapeDescriptor`], and the fixed-point scaling that maps
//!   floating point weights into the non-negative integer domain of the
//!   cryptosystem.
//! - [`paillier`]: keypair generation, randomized encryption, ciphertext-space
//!   addition and decryption for the Paillier cryptosystem, operating on
//!   explicit key material with no ambient state.
//!
//! All functions in this crate are synchronous and CPU-bound. Anything that
//! touches storage, networking or protocol state lives in `fedsum-server`.
//!
//! [`ShapeDescriptor`]: crate::model::ShapeDescriptor

pub mod model;
pub mod paillier;
