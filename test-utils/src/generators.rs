//! Shared proptest generators for SDK crates.

use proptest::prelude::*;

/// A single relative path component, never `.` or `..`.
pub fn path_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

/// One to four path components below a root.
pub fn relative_segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(path_segment(), 1..=4)
}

/// A file extension without the leading dot.
pub fn extension() -> impl Strategy<Value = String> {
    "[a-z]{1,4}"
}

/// Non-empty file contents.
pub fn file_contents() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}
