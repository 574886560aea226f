use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use ring::rand::{SecureRandom, SystemRandom};

/// Number of characters in a freshly minted token unless configured otherwise.
pub const DEFAULT_TOKEN_LENGTH: usize = 4;

/// ShortLink is the record stored for every successful upload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShortLink {
    pub token: String,      // the "xyz1" part of "https://public/xyz1"
    pub target_url: String, // absolute URL of the uploaded file on the public host
    pub created: chrono::DateTime<Utc>,
}

impl ShortLink {
    pub fn new(token: String, target_url: String) -> Self {
        Self {
            token,
            target_url,
            created: Utc::now(),
        }
    }

    /// Advisory only: nothing deletes or refuses an expired link.
    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        Utc::now() - self.created > ttl
    }
}

impl std::fmt::Display for ShortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} [created: {}]", self.token, self.target_url, self.created)
    }
}

/// returns a random token of `length` characters from the URL-safe base64 alphabet.
pub fn generate_token(rng: &SystemRandom, length: usize) -> Result<String, ring::error::Unspecified> {
    // every encoded byte yields at least one character, so `length` bytes always suffice
    let mut bytes = vec![0u8; length];
    rng.fill(&mut bytes)?;
    let mut token = BASE64URL_NOPAD.encode(&bytes);
    token.truncate(length);
    Ok(token)
}
