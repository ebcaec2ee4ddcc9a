//! Merkleized SSZ over persistent binary trees.
//!
//! Values are [`View`]s: a [`Schema`] paired with the root [`Node`] of an
//! immutable, structurally-shared binary tree. Updating a view rebuilds only
//! the spine from the touched chunk to the root, so deriving a new value
//! from an old one costs O(depth) regardless of its size.
//!
//! The four entry points used by the rest of a node are [`encode`],
//! [`decode`], [`hash_tree_root`] and the view accessors
//! ([`View::get`], [`View::set`], [`View::append`]).

use serde::Deserialize;
use std::sync::OnceLock;

pub mod codec;
pub mod error;
pub mod gindex;
pub mod merkle;
pub mod proof;
pub mod schema;
pub mod tree;
pub mod typed;
pub mod value;
pub mod view;

pub use error::{DecodeError, SchemaError, ViewError};
pub use gindex::GeneralizedIndex;
pub use proof::{MerkleProof, verify_merkle_branch};
pub use schema::{BasicType, Field, Key, Schema, SchemaKind};
pub use tree::{Node, Root, ZERO_CHUNK};
pub use typed::SszType;
pub use value::Value;
pub use view::{ContainerBuilder, View};

/// Size of a leaf chunk in bytes.
pub const BYTES_PER_CHUNK: usize = 32;

/// Size of a variable-size field offset in bytes.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;

/// Maximum number of union variants.
pub const MAX_UNION_VARIANTS: usize = 128;

/// Upper bound on buffer pre-allocation sized from a schema. Buffers grow
/// past it as content is actually produced.
pub(crate) const MAX_PREALLOCATION: usize = 1 << 16;

/// Maximum depth of a content tree. Keeps every generalized index within a
/// list or union (one level deeper) inside 64 bits.
pub const MAX_CHUNK_DEPTH: u32 = 62;

/// Serializes a view into canonical SSZ bytes.
pub fn encode(view: &View) -> Result<Vec<u8>, ViewError> {
    codec::encode(view)
}

/// Decodes untrusted bytes into a view of `schema`.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<View, DecodeError> {
    codec::decode(bytes, schema)
}

/// The 32-byte Merkle commitment of a view.
#[must_use]
pub fn hash_tree_root(view: &View) -> Root {
    view.hash_tree_root()
}

// Process-wide hashing configuration.
//
// Set once by the embedding node before the first hash is computed;
// otherwise the defaults apply.

/// Tuning knobs for root computation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashingConfig {
    /// Branches at least this high hash their two children on separate
    /// rayon tasks. Layers of at least `1 << parallel_min_height` chunks
    /// are hashed in parallel by [`merkle::merkleize`].
    pub parallel_min_height: u8,
}

impl HashingConfig {
    /// Smallest layer [`merkle::merkleize`] hashes in parallel. Heights of
    /// 64 and above switch layer parallelism off.
    #[must_use]
    pub fn parallel_layer_len(&self) -> usize {
        1usize
            .checked_shl(u32::from(self.parallel_min_height))
            .unwrap_or(usize::MAX)
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            parallel_min_height: 8,
        }
    }
}

/// A lazily-initialized, thread-safe hashing configuration.
static HASHING_CONFIG: OnceLock<HashingConfig> = OnceLock::new();

/// Errors returned when initializing the hashing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("hashing configuration was already initialized")]
    AlreadyInitialized,
}

/// Initialize the hashing configuration.
///
/// This must be called before the first root is computed. If not called,
/// [`HashingConfig::default`] is used.
pub fn init_hashing_config(config: HashingConfig) -> Result<(), ConfigError> {
    HASHING_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Initialize the hashing configuration using a constructor.
///
/// The constructor will only be called if the configuration has not been
/// initialized yet.
pub fn init_hashing_config_with<B>(builder: B) -> Result<(), ConfigError>
where
    B: FnOnce() -> HashingConfig,
{
    if HASHING_CONFIG.get().is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    init_hashing_config(builder())
}

/// The active hashing configuration.
pub fn hashing_config() -> &'static HashingConfig {
    HASHING_CONFIG.get_or_init(HashingConfig::default)
}

#[cfg(test)]
mod hashing_config_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        ConfigError, HashingConfig, hashing_config, init_hashing_config, init_hashing_config_with,
    };

    #[test]
    fn init_hashing_config_returns_already_initialized_and_does_not_call_builder() {
        // Ensure the OnceLock is initialized (possibly by other tests too).
        let _ = hashing_config();

        let calls = AtomicUsize::new(0);
        let res = init_hashing_config_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            HashingConfig::default()
        });

        assert!(matches!(res, Err(ConfigError::AlreadyInitialized)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let res = init_hashing_config(HashingConfig::default());
        assert!(matches!(res, Err(ConfigError::AlreadyInitialized)));
    }

    #[test]
    fn hashing_config_deserializes_with_defaults() {
        let config: HashingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HashingConfig::default());

        let config: HashingConfig =
            serde_json::from_str(r#"{"parallel_min_height": 3}"#).unwrap();
        assert_eq!(config.parallel_min_height, 3);

        assert!(serde_json::from_str::<HashingConfig>(r#"{"threads": 3}"#).is_err());
    }

    #[test]
    fn parallel_layer_len_saturates_for_tall_heights() {
        assert_eq!(HashingConfig::default().parallel_layer_len(), 256);

        let config: HashingConfig =
            serde_json::from_str(r#"{"parallel_min_height": 70}"#).unwrap();
        assert_eq!(config.parallel_layer_len(), usize::MAX);

        let config = HashingConfig {
            parallel_min_height: u8::MAX,
        };
        assert_eq!(config.parallel_layer_len(), usize::MAX);
    }
}
