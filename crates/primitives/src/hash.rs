use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

macro_rules! define_hash {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
        )]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn from_array(arr: [u8; 32]) -> Self {
                Self(arr)
            }

            /// Try converting 0x-prefixed hex string to the hash.
            pub fn try_from_str(s: &str) -> Result<Self, HashConversionError> {
                let Some(s) = s.strip_prefix("0x") else {
                    return Err(HashConversionError::Missing0xPrefix);
                };

                let mut arr = [0u8; 32];
                hex::decode_to_slice(s, &mut arr)?;

                Ok(Self(arr))
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn to_array(&self) -> [u8; 32] {
                self.0
            }

            /// First 4 bytes as hex, enough to tell hashes apart in logs.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(arr: [u8; 32]) -> Self {
                Self(arr)
            }
        }
    };
}

define_hash!(
    /// Content hash of a `Block`.
    BlockHash
);
define_hash!(
    /// Content hash of a `Transaction`.
    TxHash
);

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum HashConversionError {
    #[error("missing 0x prefix")]
    Missing0xPrefix,
    #[error("{0}")]
    FromHexError(#[from] hex::FromHexError),
}
