//! Secret identifiers and redaction tokens for secret-stash.
//!
//! A captured credential is reduced to an [`Identifier`]: a deterministic
//! 256-bit hex digest that is both the deduplication key of the durable
//! secret store and the opaque reference written into archived configuration
//! text in place of the secret.
//!
//! # Example
//!
//! ```
//! use stash_redact::{redact_line, IdentifierScheme};
//!
//! let scheme = IdentifierScheme::Sha256;
//! let id = scheme.identify(b"hunter2");
//! let line = redact_line("enable secret hunter2", "hunter2", &id);
//! assert!(!line.contains("hunter2"));
//! ```

pub mod error;
pub mod ident;
pub mod key;
pub mod token;

pub use error::{IdentError, Result};
pub use ident::{identify, Identifier, IdentifierScheme, IDENTIFIER_LEN};
pub use key::{KeyFile, KeyMaterial, KEY_FILE_SCHEMA_VERSION};
pub use token::{redact_line, redaction_token};
