//! Operation codec
//!
//! Maps typed operation arguments, results and events to and from the
//! byte payloads carried by a [`ReplicatedSession`](crate::session::ReplicatedSession).
//! Encoding is MessagePack via `rmp-serde`: deterministic and reversible,
//! so `decode(encode(x)) == x` for every payload type in this crate.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value into its transport representation
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a value from its transport representation
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Timestamp, Versioned};
    use crate::error::Error;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Args {
        key: String,
        value: Option<Vec<u8>>,
        version: u64,
    }

    #[test]
    fn test_unit_payload() {
        let bytes = encode(&()).unwrap();
        let back: () = decode(&bytes).unwrap();
        assert_eq!(back, ());
    }

    #[test]
    fn test_decode_wrong_type_fails() {
        let bytes = encode(&"not a number").unwrap();
        let result: Result<i64> = decode(&bytes);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    proptest! {
        #[test]
        fn prop_args_round_trip(key in ".*", value in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)), version in any::<u64>()) {
            let args = Args { key, value, version };
            let decoded: Args = decode(&encode(&args).unwrap()).unwrap();
            prop_assert_eq!(decoded, args);
        }

        #[test]
        fn prop_versioned_round_trip(value in any::<i64>(), version in any::<u64>(), micros in any::<u64>()) {
            let v = Versioned::with_timestamp(value, version, Timestamp::from_micros(micros));
            let decoded: Versioned<i64> = decode(&encode(&v).unwrap()).unwrap();
            prop_assert_eq!(decoded, v);
        }
    }
}
