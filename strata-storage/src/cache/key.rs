//! Cache key derivation.
//!
//! Keys look like `"<prefix>.<Owner>.<method>(<digest>)"` where the digest is
//! the hex SHA-256 of the arguments' textual renderings concatenated in order.
//! A call with no arguments has an empty digest.
//!
//! Renderings are joined without separators or type tags, so `("ab", "c")`
//! and `("a", "bc")` share a key. Callers who need to tell such argument
//! lists apart supply their own key function to the memoizer.

use serde_json::Value;
use sha2::{Digest, Sha256};
use strata_core::ObjectId;
use uuid::Uuid;

/// Textual rendering of a memoized-call argument.
pub trait CacheKeyArg: Sync {
    fn key_repr(&self) -> String;
}

impl CacheKeyArg for str {
    fn key_repr(&self) -> String {
        self.to_string()
    }
}

impl CacheKeyArg for String {
    fn key_repr(&self) -> String {
        self.clone()
    }
}

impl<T: CacheKeyArg + ?Sized> CacheKeyArg for &T {
    fn key_repr(&self) -> String {
        (**self).key_repr()
    }
}

macro_rules! display_key_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl CacheKeyArg for $t {
                fn key_repr(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_arg!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64, ObjectId, Uuid);

impl CacheKeyArg for Value {
    fn key_repr(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Array(items) => items.iter().map(|v| v.key_repr()).collect::<Vec<_>>().join(","),
            other => other.to_string(),
        }
    }
}

impl<T: CacheKeyArg> CacheKeyArg for Option<T> {
    fn key_repr(&self) -> String {
        match self {
            Some(v) => v.key_repr(),
            None => "null".to_string(),
        }
    }
}

impl<T: CacheKeyArg> CacheKeyArg for [T] {
    fn key_repr(&self) -> String {
        self.iter().map(|v| v.key_repr()).collect::<Vec<_>>().join(",")
    }
}

impl<T: CacheKeyArg> CacheKeyArg for Vec<T> {
    fn key_repr(&self) -> String {
        self.as_slice().key_repr()
    }
}

/// Hex digest of the concatenated argument renderings, empty for no arguments.
pub fn hash_args(args: &[&dyn CacheKeyArg]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    for arg in args {
        hasher.update(arg.key_repr().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn derive_key(prefix: &str, owner: &str, method: &str, args: &[&dyn CacheKeyArg]) -> String {
    format!("{prefix}.{owner}.{method}({})", hash_args(args))
}
