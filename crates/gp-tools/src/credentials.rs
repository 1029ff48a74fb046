//! Credential store and token substitution
//!
//! The conversation only ever sees `{{credential:NAME}}` tokens. Secrets are
//! expanded by `type_text` right before the text goes to the worker.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use zeroize::Zeroizing;

use crate::error::{Result, ToolError};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*credential:([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid regex"));

/// Opaque token referring to a stored credential
pub fn credential_token(name: &str) -> String {
    format!("{{{{credential:{}}}}}", name)
}

/// Source of secrets
pub trait CredentialStore: Send + Sync {
    /// Stored credential names, sorted
    fn names(&self) -> Vec<String>;

    fn get(&self, name: &str) -> Option<Zeroizing<String>>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Credentials held in memory, wiped on drop
#[derive(Default)]
pub struct InMemoryCredentialStore {
    secrets: BTreeMap<String, Zeroizing<String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut store = Self::new();
        for (name, secret) in pairs {
            store.insert(name, secret);
        }
        store
    }

    /// Names are matched case-insensitively
    pub fn insert(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.secrets
            .insert(name.into().to_lowercase(), Zeroizing::new(secret.into()));
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn names(&self) -> Vec<String> {
        self.secrets.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<Zeroizing<String>> {
        self.secrets.get(&name.to_lowercase()).cloned()
    }
}

/// Replace every credential token in `text` with its secret
///
/// Fails on the first unknown name, so a token is never typed literally.
/// The output buffer is sized up front and never reallocated, so no
/// unwiped copy of a secret is left behind.
pub fn expand_tokens(text: &str, store: &dyn CredentialStore) -> Result<Zeroizing<String>> {
    let mut pieces = Vec::new();
    let mut capacity = text.len();
    for caps in TOKEN.captures_iter(text) {
        let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let secret = store
            .get(name.as_str())
            .ok_or_else(|| ToolError::failed(format!("Unknown credential '{}'", name.as_str())))?;
        capacity += secret.len();
        pieces.push((token.range(), secret));
    }

    let mut expanded = Zeroizing::new(String::with_capacity(capacity));
    let mut last = 0;
    for (range, secret) in &pieces {
        expanded.push_str(&text[last..range.start]);
        expanded.push_str(secret);
        last = range.end;
    }
    expanded.push_str(&text[last..]);
    Ok(expanded)
}
