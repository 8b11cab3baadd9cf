//! Synthetics header handling
//!
//! The `X-NewRelic-Synthetics` header is an obfuscated JSON blob:
//! base64(payload XOR license-derived encoding key). The raw header value
//! is kept verbatim so outbound external calls can forward it bit-exact;
//! decoding happens only to pull the three intrinsics ids, and only when
//! the decoded account is in the collector's trusted set.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

pub const SYNTHETICS_HEADER: &str = "X-NewRelic-Synthetics";

#[derive(Debug, Clone)]
pub struct Synthetics {
    pub resource_id: String,
    pub job_id: String,
    pub monitor_id: String,
    /// Original header value, forwarded unchanged on outbound externals.
    pub header: String,
}

/// De/obfuscate with the cycling XOR key.
pub fn deobfuscate(input: &str, key: &[u8]) -> Option<Vec<u8>> {
    if key.is_empty() {
        return None;
    }
    let decoded = BASE64.decode(input.trim()).ok()?;
    Some(
        decoded
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect(),
    )
}

pub fn obfuscate(input: &[u8], key: &[u8]) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    let xored: Vec<u8> = input
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect();
    Some(BASE64.encode(xored))
}

impl Synthetics {
    /// Accept an inbound synthetics header. The payload is the JSON array
    /// `[version, account_id, resource_id, job_id, monitor_id]`; version
    /// must be 1 and the account must be trusted.
    pub fn accept(header: &str, encoding_key: &[u8], trusted_accounts: &[i64]) -> Option<Synthetics> {
        let plain = deobfuscate(header, encoding_key)?;
        let parsed: Value = serde_json::from_slice(&plain).ok()?;
        let arr = parsed.as_array()?;
        if arr.len() < 5 || arr[0].as_i64()? != 1 {
            return None;
        }
        let account = arr[1].as_i64()?;
        if !trusted_accounts.contains(&account) {
            return None;
        }
        Some(Synthetics {
            resource_id: arr[2].as_str()?.to_string(),
            job_id: arr[3].as_str()?.to_string(),
            monitor_id: arr[4].as_str()?.to_string(),
            header: header.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789";

    fn header_for(account: i64) -> String {
        let payload = format!(r#"[1,{account},"rrrrrrrrrrrrrrrrr","jjjjjjjjjjjjjjjjj","mmmmmmmmmmmmmmmmm"]"#);
        obfuscate(payload.as_bytes(), KEY).unwrap()
    }

    #[test]
    fn test_obfuscate_roundtrip() {
        let plain = b"some payload";
        let blob = obfuscate(plain, KEY).unwrap();
        assert_eq!(deobfuscate(&blob, KEY).unwrap(), plain);
    }

    #[test]
    fn test_accept_trusted() {
        let header = header_for(444);
        let s = Synthetics::accept(&header, KEY, &[111, 444]).unwrap();
        assert_eq!(s.resource_id, "rrrrrrrrrrrrrrrrr");
        assert_eq!(s.job_id, "jjjjjjjjjjjjjjjjj");
        assert_eq!(s.monitor_id, "mmmmmmmmmmmmmmmmm");
        // forwarded bit-exact
        assert_eq!(s.header, header);
    }

    #[test]
    fn test_reject_untrusted_account() {
        let header = header_for(999);
        assert!(Synthetics::accept(&header, KEY, &[111, 444]).is_none());
    }

    #[test]
    fn test_reject_bad_version() {
        let payload = r#"[2,444,"r","j","m"]"#;
        let header = obfuscate(payload.as_bytes(), KEY).unwrap();
        assert!(Synthetics::accept(&header, KEY, &[444]).is_none());
    }

    #[test]
    fn test_reject_garbage() {
        assert!(Synthetics::accept("not base64 at all!!!", KEY, &[444]).is_none());
        assert!(Synthetics::accept(&header_for(444), b"", &[444]).is_none());
    }
}
