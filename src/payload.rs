//! Key/value generation and the `SET` wire command.
//!
//! Commands are a single text line:
//!
//! ```text
//! SET <key> <value>\n
//! ```
//!
//! Keys and values contain no whitespace and need no escaping.

use bytes::{BufMut, Bytes, BytesMut};
use clap::ValueEnum;
use rand::Rng;
use serde::Deserialize;
use std::fmt;

/// Characters keys and values are drawn from.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a random key
pub const KEY_LEN: usize = 8;

/// Length of a random value
pub const VALUE_LEN: usize = 12;

/// Draw `len` characters uniformly from [`ALPHABET`].
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// How each worker picks its key and value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    /// 8 and 12 random characters; collisions across workers are allowed.
    #[default]
    Random,
    /// `key{index}` / `value{index}`, unique per worker.
    Sequential,
}

impl PayloadMode {
    pub fn generate(self, index: usize) -> SetCommand {
        match self {
            PayloadMode::Random => SetCommand::random(&mut rand::thread_rng()),
            PayloadMode::Sequential => SetCommand::sequential(index),
        }
    }
}

/// A single `SET` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCommand {
    pub key: String,
    pub value: String,
}

impl SetCommand {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        SetCommand {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let key = random_token(rng, KEY_LEN);
        let value = random_token(rng, VALUE_LEN);
        SetCommand { key, value }
    }

    pub fn sequential(index: usize) -> Self {
        SetCommand::new(format!("key{index}"), format!("value{index}"))
    }

    /// Encode as `SET {key} {value}\n`.
    pub fn encode(&self) -> Bytes {
        // "SET " + key + " " + value + "\n"
        let mut buf = BytesMut::with_capacity(6 + self.key.len() + self.value.len());
        buf.put_slice(b"SET ");
        buf.put_slice(self.key.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.value.as_bytes());
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

impl fmt::Display for SetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SET {} {}", self.key, self.value)
    }
}
