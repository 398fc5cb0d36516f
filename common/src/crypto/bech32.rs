// Bech32 (BIP-0173) encoding for human-readable addresses.
// Only the pieces the chain needs: 8-to-5 bit regrouping, checksum
// creation and verification.

use thiserror::Error;

const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Bech32Error {
    #[error("invalid character at position {0}")]
    InvalidCharacter(usize),
    #[error("mixed-case string")]
    MixedCase,
    #[error("missing separator")]
    MissingSeparator,
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("invalid data length")]
    InvalidLength,
    #[error("invalid padding bits")]
    InvalidPadding,
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ (*value as u32);
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut expanded = Vec::with_capacity(hrp.len() * 2 + 1);
    for byte in hrp.bytes() {
        expanded.push(byte >> 5);
    }
    expanded.push(0);
    for byte in hrp.bytes() {
        expanded.push(byte & 0x1f);
    }
    expanded
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let polymod = polymod(&values) ^ 1;
    let mut checksum = [0u8; 6];
    for (i, value) in checksum.iter_mut().enumerate() {
        *value = ((polymod >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == 1
}

/// Regroup a byte stream between bit widths, optionally padding the tail
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Bech32Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut output = Vec::new();
    let max_value: u32 = (1 << to) - 1;
    for value in data {
        let value = *value as u32;
        if value >> from != 0 {
            return Err(Bech32Error::InvalidLength);
        }
        acc = (acc << from) | value;
        bits += from;
        while bits >= to {
            bits -= to;
            output.push(((acc >> bits) & max_value) as u8);
        }
    }
    if pad {
        if bits > 0 {
            output.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return Err(Bech32Error::InvalidPadding);
    }
    Ok(output)
}

/// Encode raw bytes under the given human-readable prefix
pub fn encode(hrp: &str, payload: &[u8]) -> Result<String, Bech32Error> {
    let data = convert_bits(payload, 8, 5, true)?;
    let checksum = create_checksum(hrp, &data);
    let mut encoded = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    encoded.push_str(hrp);
    encoded.push('1');
    for value in data.iter().chain(checksum.iter()) {
        encoded.push(CHARSET[*value as usize] as char);
    }
    Ok(encoded)
}

/// Decode a bech32 string into its prefix and raw payload bytes
pub fn decode(encoded: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let has_lower = encoded.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = encoded.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Bech32Error::MixedCase);
    }
    let encoded = encoded.to_ascii_lowercase();

    let separator = encoded.rfind('1').ok_or(Bech32Error::MissingSeparator)?;
    if separator == 0 || separator + 7 > encoded.len() {
        return Err(Bech32Error::InvalidLength);
    }
    let (hrp, rest) = encoded.split_at(separator);
    let rest = &rest[1..];

    let mut data = Vec::with_capacity(rest.len());
    for (i, c) in rest.bytes().enumerate() {
        let value = CHARSET
            .iter()
            .position(|x| *x == c)
            .ok_or(Bech32Error::InvalidCharacter(separator + 1 + i))?;
        data.push(value as u8);
    }

    if !verify_checksum(hrp, &data) {
        return Err(Bech32Error::InvalidChecksum);
    }

    let payload = convert_bits(&data[..data.len() - 6], 5, 8, false)?;
    Ok((hrp.to_string(), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() -> Result<(), Bech32Error> {
        let payload = [0xabu8; 20];
        let encoded = encode("nhb", &payload)?;
        assert!(encoded.starts_with("nhb1"));
        let (hrp, decoded) = decode(&encoded)?;
        assert_eq!(hrp, "nhb");
        assert_eq!(decoded, payload);
        Ok(())
    }

    #[test]
    fn corrupted_checksum_rejected() -> Result<(), Bech32Error> {
        let encoded = encode("nhb", &[1u8; 20])?;
        let mut corrupted = encoded.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'q' { b'p' } else { b'q' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert_eq!(decode(&corrupted), Err(Bech32Error::InvalidChecksum));
        Ok(())
    }

    #[test]
    fn mixed_case_rejected() {
        assert_eq!(decode("Nhb1qqqq"), Err(Bech32Error::MixedCase));
    }
}
