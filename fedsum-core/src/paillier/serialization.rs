//! Wire format for ciphertext vectors and keypairs.
//!
//! Ciphertext vectors travel as pipe-delimited decimal strings,
//! `"c1|c2|...|cL"`, and a keypair as `"phi|g|n"`. The decimal rendering
//! keeps the payloads valid inside JSON documents without base64 or binary
//! framing.

use std::{fmt, str::FromStr};

use num::{bigint::BigUint, traits::Num};
use serde::{
    de::{Deserializer, Error as _},
    ser::Serializer,
    Deserialize, Serialize,
};
use thiserror::Error;

use crate::paillier::{EncryptedVector, KeyPair};

const COMPONENT_SEPARATOR: char = '|';

/// Errors related to parsing the pipe-delimited wire format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireFormatError {
    #[error("the wire string is empty")]
    Empty,

    #[error("component {index} is not a decimal integer")]
    InvalidComponent { index: usize },

    #[error("expected {expected} components, got {actual}")]
    ComponentCountMismatch { expected: usize, actual: usize },
}

impl fmt::Display for EncryptedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, component) in self.iter().enumerate() {
            if index > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for EncryptedVector {
    type Err = WireFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(WireFormatError::Empty);
        }
        let components = s
            .split(COMPONENT_SEPARATOR)
            .enumerate()
            .map(|(index, component)| {
                BigUint::from_str_radix(component, 10)
                    .map_err(|_| WireFormatError::InvalidComponent { index })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(components.into())
    }
}

impl Serialize for EncryptedVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EncryptedVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.phi, self.g, self.n)
    }
}

impl FromStr for KeyPair {
    type Err = WireFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(WireFormatError::Empty);
        }
        let components: Vec<&str> = s.split(COMPONENT_SEPARATOR).collect();
        if components.len() != 3 {
            return Err(WireFormatError::ComponentCountMismatch {
                expected: 3,
                actual: components.len(),
            });
        }
        let mut parsed = components.iter().enumerate().map(|(index, component)| {
            BigUint::from_str_radix(component, 10)
                .map_err(|_| WireFormatError::InvalidComponent { index })
        });
        // the iterator has exactly three items at this point
        let phi = parsed.next().unwrap()?;
        let g = parsed.next().unwrap()?;
        let n = parsed.next().unwrap()?;
        Ok(KeyPair { n, g, phi })
    }
}
