//! Security module - Log redaction and secret handling
//!
//! - Masking credential values and URLs before they reach tracing output
//! - Zeroizing storage for captured credentials

mod sanitizer;
mod secure_string;

pub use sanitizer::Sanitizer;
pub use secure_string::SecureString;
