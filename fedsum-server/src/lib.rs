//! # Fedsum server
//!
//! The coordinator of the Fedsum federated-learning network.
//!
//! A training project groups a fixed set of participants around a model
//! architecture and a Paillier public key. Training proceeds in rounds:
//! participants download the current global model, train locally, and
//! submit their updated parameters encrypted under the project key. Once
//! enough submissions have arrived the coordinator folds them together in
//! ciphertext space and republishes the still-encrypted aggregate as the
//! next round's global model. The private key never reaches the
//! coordinator; only the participants can decrypt what they download.
//!
//! The crate is organized around a handful of modules:
//!
//! - [`settings`]: configuration loading and validation,
//! - [`project`]: the project, round and submission domain types,
//! - [`storage`]: abstract project and artifact storage plus the in-memory
//!   backend,
//! - [`aggregator`]: submission intake and per-round bookkeeping,
//! - [`protocol`]: project registration and the round advancement protocol,
//! - [`trigger`]: the event source that asks the protocol to advance,
//! - [`rest`]: the HTTP API.

#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate serde;

#[macro_use]
extern crate tracing;

#[macro_use]
extern crate validator_derive;

pub mod aggregator;
pub mod project;
pub mod protocol;
pub mod rest;
pub mod settings;
pub mod storage;
pub mod trigger;
