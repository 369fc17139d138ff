//! Shared-secret access gate for the dashboard.

use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Where a successful login is remembered between requests.
///
/// Only the digest of the secret is ever handed to a store.
pub trait CredentialStore {
    fn cached(&self) -> Option<String>;

    fn persist(&mut self, credential: &str);

    fn clear(&mut self);
}

/// Single shared secret guarding the dashboard.
///
/// An empty secret disables the gate: every check passes.
#[derive(Clone)]
pub struct AccessGate {
    digest: Option<String>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AccessGate {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: (!secret.is_empty()).then(|| digest(secret)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.digest.is_some()
    }

    /// Check `input` against the configured secret.
    pub fn validate(&self, input: &str) -> bool {
        match &self.digest {
            Some(expected) => constant_time_eq(digest(input).as_bytes(), expected.as_bytes()),
            None => true,
        }
    }

    /// Check whether `store` remembers a successful login.
    pub fn has_valid_cached_credential(&self, store: &impl CredentialStore) -> bool {
        match (&self.digest, store.cached()) {
            (None, _) => true,
            (Some(expected), Some(cached)) => constant_time_eq(cached.as_bytes(), expected.as_bytes()),
            (Some(_), None) => false,
        }
    }

    /// Validate `input` and remember it in `store` on success.
    pub fn login(&self, store: &mut impl CredentialStore, input: &str) -> bool {
        if !self.validate(input) {
            warn!("dashboard login rejected");
            return false;
        }

        if let Some(expected) = &self.digest {
            store.persist(expected);
            info!("dashboard login accepted");
        }
        true
    }

    pub fn logout(&self, store: &mut impl CredentialStore) {
        store.clear();
    }
}

/// Hex encoded SHA-256 of `secret`.
pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryStore(Option<String>);

    impl CredentialStore for MemoryStore {
        fn cached(&self) -> Option<String> {
            self.0.clone()
        }

        fn persist(&mut self, credential: &str) {
            self.0 = Some(credential.to_string());
        }

        fn clear(&mut self) {
            self.0 = None;
        }
    }

    #[test]
    fn test_validate() {
        struct TestCase {
            secret: &'static str,
            input: &'static str,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: correct secret
                secret: "hunter2",
                input: "hunter2",
                expected: true,
            },
            TestCase {
                // TC1: wrong secret
                secret: "hunter2",
                input: "hunter3",
                expected: false,
            },
            TestCase {
                // TC2: empty input
                secret: "hunter2",
                input: "",
                expected: false,
            },
            TestCase {
                // TC3: gate disabled
                secret: "",
                input: "anything",
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = AccessGate::new(test.secret).validate(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_login_persists_digest_and_logout_clears() {
        let gate = AccessGate::new("hunter2");
        let mut store = MemoryStore::default();
        assert!(!gate.has_valid_cached_credential(&store));

        assert!(gate.login(&mut store, "hunter2"));
        assert_eq!(store.0.as_deref(), Some(digest("hunter2").as_str()));
        assert!(gate.has_valid_cached_credential(&store));

        gate.logout(&mut store);
        assert!(!gate.has_valid_cached_credential(&store));
    }

    #[test]
    fn test_failed_login_persists_nothing() {
        let gate = AccessGate::new("hunter2");
        let mut store = MemoryStore::default();

        assert!(!gate.login(&mut store, "wrong"));
        assert_eq!(store.0, None);
    }

    #[test]
    fn test_stale_credential_after_secret_change_is_rejected() {
        let mut store = MemoryStore::default();
        AccessGate::new("old").login(&mut store, "old");

        assert!(!AccessGate::new("new").has_valid_cached_credential(&store));
    }

    #[test]
    fn test_disabled_gate_accepts_without_credential() {
        let gate = AccessGate::new("");

        assert!(!gate.is_enabled());
        assert!(gate.has_valid_cached_credential(&MemoryStore::default()));
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
