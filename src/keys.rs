//! Deterministic cache-key derivation.
//!
//! A key is `"{kind}:{digest}"` where `digest` is the first 16 hex
//! characters of a SHA-256 over a canonical rendering of the arguments:
//! positional arguments in call order, then named arguments as
//! `name=value` sorted by name, all joined with `|`.
//!
//! The digest is stable across processes and restarts, which is what a
//! shared store needs (an in-process `DefaultHasher` is not).
//!
//! ```
//! use heimdall::keys::{KeyArgs, KeyHasher};
//!
//! let a = KeyArgs::new().arg("what is rust?").named("k", 10).named("doc_id", None::<&str>);
//! let b = KeyArgs::new().arg("what is rust?").named("doc_id", None::<&str>).named("k", 10);
//! assert_eq!(KeyHasher::derive("query", &a), KeyHasher::derive("query", &b));
//! ```

use sha2::{Digest, Sha256};

/// Separator between canonical argument parts.
const SEPARATOR: &str = "|";

/// Number of digest bytes kept (16 hex characters).
const DIGEST_BYTES: usize = 8;

/// Rendering of an absent optional argument.
const ABSENT: &str = "null";

/// String form of a value taking part in a cache key.
pub trait KeyArg {
    fn key_repr(&self) -> String;
}

impl KeyArg for str {
    fn key_repr(&self) -> String {
        self.to_owned()
    }
}

impl KeyArg for String {
    fn key_repr(&self) -> String {
        self.clone()
    }
}

impl<T: KeyArg + ?Sized> KeyArg for &T {
    fn key_repr(&self) -> String {
        (**self).key_repr()
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn key_repr(&self) -> String {
        match self {
            Some(v) => v.key_repr(),
            None => ABSENT.to_owned(),
        }
    }
}

macro_rules! display_key_arg {
    ($($t:ty),*) => {
        $(
            impl KeyArg for $t {
                fn key_repr(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_arg!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

/// Ordered argument set for key derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyArgs {
    positional: Vec<String>,
    named: Vec<(String, String)>,
}

impl KeyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl KeyArg) -> Self {
        self.positional.push(value.key_repr());
        self
    }

    /// Add a named argument. Call order of named arguments is irrelevant.
    pub fn named(mut self, name: &str, value: impl KeyArg) -> Self {
        self.named.push((name.to_owned(), value.key_repr()));
        self
    }

    /// Value of a named argument, if present.
    pub fn get_named(&self, name: &str) -> Option<&str> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Canonical string the digest is computed over.
    pub fn canonical(&self) -> String {
        let mut named: Vec<&(String, String)> = self.named.iter().collect();
        named.sort();

        let mut parts: Vec<String> = self.positional.clone();
        parts.extend(named.into_iter().map(|(k, v)| format!("{k}={v}")));
        parts.join(SEPARATOR)
    }
}

/// Cache-key derivation.
pub struct KeyHasher;

impl KeyHasher {
    /// Derive `"{kind}:{digest}"`.
    pub fn derive(kind: &str, args: &KeyArgs) -> String {
        format!("{kind}:{}", digest(&args.canonical()))
    }

    /// Derive `"{kind}:{scope}:{digest}"`.
    ///
    /// The scope segment stays readable so entries can be found by prefix
    /// (see [`scope_prefix`](Self::scope_prefix)); the digest still covers
    /// every argument.
    pub fn derive_scoped(kind: &str, scope: &str, args: &KeyArgs) -> String {
        format!("{kind}:{scope}:{}", digest(&args.canonical()))
    }

    /// Prefix shared by every key derived with the given kind and scope.
    pub fn scope_prefix(kind: &str, scope: &str) -> String {
        format!("{kind}:{scope}:")
    }
}

fn digest(canonical: &str) -> String {
    let hash = Sha256::digest(canonical.as_bytes());
    hex::encode(&hash[..DIGEST_BYTES])
}
