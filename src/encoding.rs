//! Serde helpers shared by persisted records and configuration files

/// Serialize a `BigUint` as a base-10 string.
///
/// Targets and difficulties routinely exceed 64 bits, so JSON numbers are
/// not an option. Use with `#[serde(with = "crate::encoding::biguint_decimal")]`.
pub mod biguint_decimal {
    use num_bigint::BigUint;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let text = String::deserialize(deserializer)?;
        BigUint::parse_bytes(text.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal integer: {text}")))
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super::biguint_decimal")]
        value: BigUint,
    }

    #[test]
    fn test_large_value_survives_json() {
        let value = (BigUint::from(1u8) << 200u32) + BigUint::from(7u8);
        let json = serde_json::to_string(&Wrapper { value: value.clone() }).unwrap();
        assert!(json.contains('"'));

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, value);
    }

    #[test]
    fn test_rejects_garbage() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"value":"12ab"}"#);
        assert!(result.is_err());
    }
}
