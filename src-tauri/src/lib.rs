//! ShareLaTeX shell - Desktop wrapper that signs into a ShareLaTeX server
//!
//! The main window asks for a sign-in window; once the user has logged in
//! there, the shell quietly reads the session cookie and the page's CSRF
//! token, hands both back to the main window and closes the sign-in window.
//!
//! ## Architecture
//!
//! - **Harvest**: per-request session state machine, host traits, manager
//! - **Bridge**: returns values from injected page scripts
//! - **Config**: persistent harvest settings
//! - **Security**: log redaction, zeroizing secret storage
//! - **Desktop** (feature `desktop`): Tauri host, IPC commands, entry point

pub mod bridge;
pub mod config;
pub mod harvest;
pub mod security;

#[cfg(feature = "desktop")]
pub mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;
