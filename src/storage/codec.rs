//! Key <-> filename codec.
//!
//! Keys are arbitrary strings supplied by clients, so they are never used as
//! path components directly. Each key is stored under the lowercase hex of its
//! UTF-8 bytes: the result only contains `[0-9a-f]`, cannot traverse
//! directories, cannot collide unless the keys themselves collide, and sorts
//! the same way the raw bytes do.

/// Extension of durable, visible entries.
pub const COMMITTED_EXT: &str = "txt";

/// Extension of entries written during the stage phase of a batch write.
pub const STAGED_EXT: &str = "tmp";

/// Encodes a key into an extension-less filename.
pub fn encode_key(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Decodes an extension-less filename back into its key.
///
/// Returns `None` for names that were not produced by [`encode_key`]
/// (foreign files dropped into the storage directory).
pub fn decode_key(stem: &str) -> Option<String> {
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

/// Full filename for `key` with the given extension.
pub fn file_name(key: &str, ext: &str) -> String {
    format!("{}.{}", encode_key(key), ext)
}

/// Splits `name` into its stem if it carries `ext`.
pub fn strip_ext<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    name.strip_suffix(ext)?.strip_suffix('.')
}
