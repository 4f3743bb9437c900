//! Redb table definitions and key encoding utilities.
//!
//! Redb wants static table definitions, so logical tables are encoded as a
//! name prefix on keys inside one physical table.

use redb::TableDefinition;

/// The physical table that stores all key-value pairs.
pub const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("meshvec_data");

/// Separator byte between table name and key in the encoded key.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Encode a logical table name and key into a physical key.
///
/// The format is `<table_name><separator><key>`.
pub fn encode_key(table: &str, key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(table.len() + 1 + key.len());
    encoded.extend_from_slice(table.as_bytes());
    encoded.push(KEY_SEPARATOR);
    encoded.extend_from_slice(key);
    encoded
}

/// Decode a physical key into its logical table name and original key.
///
/// Returns `None` if the key is malformed (missing separator).
pub fn decode_key(encoded: &[u8]) -> Option<(&str, &[u8])> {
    let sep_pos = encoded.iter().position(|&b| b == KEY_SEPARATOR)?;
    let table = std::str::from_utf8(&encoded[..sep_pos]).ok()?;
    Some((table, &encoded[sep_pos + 1..]))
}

/// The exclusive upper bound of every key starting with `prefix`.
///
/// Returns `None` when no such bound exists (the prefix is all `0xff`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Logical table names used by meshvec.
pub mod names {
    /// Collection configurations, keyed by collection id bytes.
    pub const COLLECTIONS: &str = "collections";

    /// Append-only history, keyed by collection id, timestamp and entry id.
    pub const HISTORY: &str = "history";

    /// Key-value pairs this node serves for the distributed hash table.
    pub const DHT: &str = "dht";

    /// Vector rows of one collection, keyed by fingerprint.
    pub const VECTORS: &str = "vectors";

    /// Metadata payloads of one collection, keyed by fingerprint.
    pub const METADATA: &str = "metadata";

    /// Fingerprint to handle assignments plus the handle counter.
    pub const IDENTITY: &str = "identity";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_key() {
        let encoded = encode_key("vectors", b"abc");
        let (table, key) = decode_key(&encoded).expect("decode");
        assert_eq!(table, "vectors");
        assert_eq!(key, b"abc");
    }

    #[test]
    fn test_encode_decode_empty_key() {
        let encoded = encode_key("identity", b"");
        let (table, key) = decode_key(&encoded).expect("decode");
        assert_eq!(table, "identity");
        assert!(key.is_empty());
    }

    #[test]
    fn test_tables_do_not_overlap() {
        // "vectors" must not see keys from a table named "vectors2".
        let a = encode_key("vectors", b"\xff");
        let b = encode_key("vectors2", b"");
        let end = prefix_end(&encode_key("vectors", b"")).expect("end");
        assert!(a < end);
        assert!(b >= end);
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_end(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_end(b"\xff\xff"), None);
    }
}
