use serde::Serialize;

/// Canonical JSON encoding: the value tree is rebuilt through
/// `serde_json::Value`, whose object representation sorts keys, then
/// written compactly. Signer and verifier must both canonicalize through
/// this function for digests over JSON documents to agree.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// Seconds in a day, used by engagement windows and intent expiry math
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Day index since the unix epoch for a timestamp in seconds
pub fn unix_day(timestamp: u64) -> u64 {
    timestamp / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u32,
        alpha: u32,
    }

    #[test]
    fn keys_are_sorted_and_compact() -> Result<(), serde_json::Error> {
        let bytes = canonical_json(&Unordered { zeta: 1, alpha: 2 })?;
        assert_eq!(bytes, br#"{"alpha":2,"zeta":1}"#);
        Ok(())
    }

    #[test]
    fn canonicalization_is_stable() -> Result<(), serde_json::Error> {
        let a = canonical_json(&Unordered { zeta: 9, alpha: 0 })?;
        let b = canonical_json(&Unordered { zeta: 9, alpha: 0 })?;
        assert_eq!(a, b);
        Ok(())
    }
}
