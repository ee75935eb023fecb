//! Bucket and key naming rules, checked before any request is sent.

use s3probe_core::{ParamReader, ParameterError};

const MAX_KEY_BYTES: usize = 1024;

pub(crate) fn check_bucket(name: &str) -> Result<(), &'static str> {
    if !(3..=63).contains(&name.len()) {
        return Err("bucket name must be between 3 and 63 characters");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return Err("bucket name may only contain lowercase letters, digits, '.' and '-'");
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err("bucket name must start and end with a letter or digit");
    }
    if name.contains("..") {
        return Err("bucket name must not contain consecutive periods");
    }
    Ok(())
}

pub(crate) fn check_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() || key.len() > MAX_KEY_BYTES {
        return Err("object key must be between 1 and 1024 bytes");
    }
    Ok(())
}

/// Reads a required, valid bucket name from `field`.
pub(crate) fn bucket(reader: &ParamReader<'_>, field: &str) -> Result<String, ParameterError> {
    let name = reader.require_str(field)?;
    check_bucket(&name).map_err(|reason| reader.error(field, reason))?;
    Ok(name)
}

pub(crate) fn key(reader: &ParamReader<'_>, field: &str) -> Result<String, ParameterError> {
    let key = reader.require_str(field)?;
    check_key(&key).map_err(|reason| reader.error(field, reason))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_bucket_names() {
        for name in ["abc", "my-bucket", "logs.2024.example", &"a".repeat(63)] {
            assert!(check_bucket(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_invalid_bucket_names() {
        for name in [
            "ab",
            &"a".repeat(64),
            "MyBucket",
            "under_score",
            "-leading",
            "trailing.",
            "double..dot",
        ] {
            assert!(check_bucket(name).is_err(), "{name}");
        }
    }

    #[test]
    fn key_length_is_counted_in_bytes() {
        assert!(check_key("a").is_ok());
        assert!(check_key(&"é".repeat(512)).is_ok());
        assert!(check_key(&"é".repeat(513)).is_err());
        assert!(check_key("").is_err());
    }
}
