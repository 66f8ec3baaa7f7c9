//! Redaction helpers for logging
//!
//! Session cookies and CSRF tokens pass through tracing output while a
//! harvest runs. Nothing sensitive should reach the log unmasked.

/// Sanitizer for sensitive data
///
/// Stateless; every method takes the raw value and returns a display-safe copy.
pub struct Sanitizer;

impl Sanitizer {
    /// Sanitizes a token or cookie value for safe logging
    ///
    /// Shows only the last 4 characters preceded by "***".
    ///
    /// # Examples
    ///
    /// ```
    /// use sharelatex_shell_lib::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::sanitize_token("s%3AaBcDeFgHiJkLmN"), "***kLmN");
    /// assert_eq!(Sanitizer::sanitize_token("abc"), "****");
    /// ```
    pub fn sanitize_token(token: &str) -> String {
        let count = token.chars().count();
        if count > 4 {
            let tail: String = token.chars().skip(count - 4).collect();
            format!("***{}", tail)
        } else {
            "****".to_string()
        }
    }

    /// Sanitizes a URL by removing query parameters and fragments
    ///
    /// Login redirects often carry one-time codes in the query string.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharelatex_shell_lib::security::Sanitizer;
    ///
    /// assert_eq!(
    ///     Sanitizer::sanitize_url("https://latex.example.org/login?redir=/project#top"),
    ///     "https://latex.example.org/login"
    /// );
    /// ```
    pub fn sanitize_url(url: &str) -> String {
        let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
        url[..end].to_string()
    }
}
