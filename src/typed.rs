//! Typed wrappers over views.

use crate::error::{DecodeError, ViewError};
use crate::schema::Schema;
use crate::tree::Root;
use crate::view::View;

/// A Rust type backed by a [`View`] of one fixed schema.
///
/// Implementors provide the schema and the wrapping; serialization and
/// hashing come for free. Field accessors are written on the wrapper on
/// top of [`View::field`] and friends.
pub trait SszType: Sized {
    /// The schema every value of this type is a view of.
    fn schema() -> &'static Schema;

    /// Wraps a view without checking its schema.
    ///
    /// Use [`SszType::try_from_view`] for views of unknown origin.
    fn wrap(view: View) -> Self;

    fn as_view(&self) -> &View;

    /// Wraps `view` if its schema is [`SszType::schema`].
    fn try_from_view(view: View) -> Result<Self, ViewError> {
        if view.schema() != Self::schema() {
            return Err(ViewError::SchemaMismatch);
        }
        Ok(Self::wrap(view))
    }

    /// The all-default value.
    fn default_value() -> Self {
        Self::wrap(View::default_of(Self::schema()))
    }

    /// Canonical SSZ serialization.
    fn to_ssz_bytes(&self) -> Result<Vec<u8>, ViewError> {
        self.as_view().encode()
    }

    /// Decodes untrusted bytes.
    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::codec::decode(bytes, Self::schema()).map(Self::wrap)
    }

    fn hash_tree_root(&self) -> Root {
        self.as_view().hash_tree_root()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::{Key, Value};

    /// `{epoch: uint64, root: Bytes32}`
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Checkpoint(View);

    impl SszType for Checkpoint {
        fn schema() -> &'static Schema {
            static SCHEMA: OnceLock<Schema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                Schema::container([("epoch", Schema::uint64()), ("root", Schema::bytes32())])
                    .expect("checkpoint schema is valid")
            })
        }

        fn wrap(view: View) -> Self {
            Self(view)
        }

        fn as_view(&self) -> &View {
            &self.0
        }
    }

    impl Checkpoint {
        fn epoch(&self) -> u64 {
            self.0.get_uint(Key::Name("epoch")).unwrap() as u64
        }

        fn with_epoch(&self, epoch: u64) -> Self {
            Self(
                self.0
                    .set(Key::Name("epoch"), &Value::Uint(u128::from(epoch)))
                    .unwrap(),
            )
        }
    }

    #[test]
    fn test_typed_wrapper_round_trip() {
        let checkpoint = Checkpoint::default_value().with_epoch(12);
        assert_eq!(checkpoint.epoch(), 12);

        let bytes = checkpoint.to_ssz_bytes().unwrap();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..8], &12u64.to_le_bytes());

        let decoded = Checkpoint::from_ssz_bytes(&bytes).unwrap();
        assert_eq!(decoded, checkpoint);
        assert_eq!(decoded.hash_tree_root(), checkpoint.hash_tree_root());
        assert_eq!(
            Checkpoint::from_ssz_bytes(&bytes[..39]),
            Err(DecodeError::TruncatedInput {
                len: 39,
                expected: 40
            })
        );
    }

    #[test]
    fn test_try_from_view_checks_schema() {
        let rebuilt = Schema::container([("epoch", Schema::uint64()), ("root", Schema::bytes32())]).unwrap();
        assert!(Checkpoint::try_from_view(View::default_of(&rebuilt)).is_ok());
        assert_eq!(
            Checkpoint::try_from_view(View::default_of(&Schema::uint64())),
            Err(ViewError::SchemaMismatch)
        );
    }
}
