//! Value codecs.
//!
//! A [`Codec`] turns a value into the string form kept in a store and back.
//! Round-tripping (`decode(encode(v)) == v`) is assumed, not re-checked.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Encodes values of `T` to strings and decodes them back.
pub trait Codec<T> {
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    fn decode(&self, raw: &str) -> Result<T, CodecError>;
}

/// JSON codec over `serde_json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(CodecError::Encode)
    }

    fn decode(&self, raw: &str) -> Result<T, CodecError> {
        serde_json::from_str(raw).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        font_size: u8,
    }

    #[test]
    fn json_matches_serde_json_output() {
        let raw = Codec::<i32>::encode(&JsonCodec, &2).unwrap();
        assert_eq!(raw, "2");
        let raw = Codec::<String>::encode(&JsonCodec, &"abc-123".to_string()).unwrap();
        assert_eq!(raw, "\"abc-123\"");
    }

    #[test]
    fn json_round_trips_structs() {
        let prefs = Prefs {
            theme: "dark".into(),
            font_size: 14,
        };
        let raw = JsonCodec.encode(&prefs).unwrap();
        let back: Prefs = JsonCodec.decode(&raw).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        let err = Codec::<u32>::decode(&JsonCodec, "{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn non_string_map_keys_fail_to_encode() {
        let mut map: HashMap<(u8, u8), u8> = HashMap::new();
        map.insert((1, 2), 3);
        let err = JsonCodec.encode(&map).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));
    }

    #[test]
    fn null_decodes_into_option() {
        let value: Option<String> = JsonCodec.decode("null").unwrap();
        assert_eq!(value, None);
    }
}
