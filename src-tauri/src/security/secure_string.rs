//! Zeroizing storage for captured credential values
//!
//! Holds the session cookie and CSRF token between capture and hand-off,
//! and wipes them when the harvest session is dropped.

use std::fmt;
use std::ops::Deref;
use zeroize::Zeroize;

/// A string that securely clears its memory when dropped
///
/// # Example
///
/// ```
/// use sharelatex_shell_lib::security::SecureString;
///
/// let sid = SecureString::new("s%3Aabc123".to_string());
/// assert_eq!(sid.as_str(), "s%3Aabc123");
/// assert_eq!(format!("{:?}", sid), "SecureString { len: 10, content: \"[REDACTED]\" }");
/// ```
#[derive(Clone)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Wraps an owned value without copying it
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    /// Returns the string as a slice
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns the length of the string in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the string is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Zeroize for SecureString {
    fn zeroize(&mut self) {
        self.inner.zeroize();
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

// No Display; Debug never prints the content
impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.inner.len())
            .field("content", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.inner.as_bytes())
    }
}

impl Eq for SecureString {}

impl PartialEq<&str> for SecureString {
    fn eq(&self, other: &&str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
