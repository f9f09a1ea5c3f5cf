use secrecy::{ExposeSecret, SecretSlice};

/// Secrets supplied by the caller for one encrypt or decrypt call.
///
/// The password defaults to empty. An explicit salt replaces the salt read
/// from (or written to) the container header when deriving keys.
pub struct Credentials {
    password: SecretSlice<u8>,
    salt: Option<Vec<u8>>,
    secret: Option<SecretSlice<u8>>,
}

impl Credentials {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: SecretSlice::from(password.into()),
            salt: None,
            secret: None,
        }
    }

    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Argon2 secret value K, mixed into the KDF alongside the password.
    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(SecretSlice::from(secret.into()));
        self
    }

    pub fn password(&self) -> &[u8] {
        self.password.expose_secret()
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.salt.as_deref()
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_ref().map(|s| s.expose_secret()).unwrap_or_default()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"[REDACTED]")
            .field("salt", &self.salt.as_ref().map(Vec::len))
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
