//! Short-link creation and resolution on top of a [`TokenStore`].

use async_trait::async_trait;
use ring::rand::SystemRandom;
use url::Url;

use crate::{
    db::{DbError, TokenStore},
    model::{self, ShortLink},
};

/// How many fresh tokens are tried before giving up on a colliding store.
const MAX_MINT_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ShortLinkError {
    #[error("invalid target url: {0:?}")]
    InvalidTarget(String),
    #[error("token cannot be empty")]
    EmptyToken,
    #[error("short link not found")]
    NotFound,
    #[error("token generation failed")]
    Mint,
    #[error("no free token after {0} attempts")]
    TokensExhausted(usize),
    #[error("persistence failure: {0}")]
    Persistence(#[source] DbError),
}

/// The short-link capability the request router depends on.
#[async_trait]
pub trait ShortLinks: Send + Sync {
    async fn create_short_link(&self, full_url: &str) -> Result<ShortLink, ShortLinkError>;

    async fn resolve_token(&self, token: &str) -> Result<String, ShortLinkError>;
}

/// Produces candidate tokens.
pub trait TokenMinter: Send + Sync {
    fn mint(&self) -> Result<String, ShortLinkError>;
}

pub struct RandomMinter {
    rng: SystemRandom,
    length: usize,
}

impl RandomMinter {
    pub fn new(length: usize) -> Self {
        Self {
            rng: SystemRandom::new(),
            length,
        }
    }
}

impl Default for RandomMinter {
    fn default() -> Self {
        Self::new(model::DEFAULT_TOKEN_LENGTH)
    }
}

impl TokenMinter for RandomMinter {
    fn mint(&self) -> Result<String, ShortLinkError> {
        model::generate_token(&self.rng, self.length).map_err(|_| ShortLinkError::Mint)
    }
}

/// Accepts only absolute URLs that carry both a scheme and a host.
pub fn validate_target(full_url: &str) -> Result<Url, ShortLinkError> {
    if full_url.is_empty() {
        return Err(ShortLinkError::InvalidTarget(full_url.to_string()));
    }

    match Url::parse(full_url) {
        Ok(parsed) if parsed.host_str().is_some_and(|host| !host.is_empty()) => Ok(parsed),
        _ => Err(ShortLinkError::InvalidTarget(full_url.to_string())),
    }
}

pub struct ShortLinkService<S: TokenStore, M: TokenMinter> {
    store: S,
    minter: M,
}

impl<S: TokenStore, M: TokenMinter> ShortLinkService<S, M> {
    pub fn new(store: S, minter: M) -> Self {
        Self { store, minter }
    }
}

#[async_trait]
impl<S: TokenStore, M: TokenMinter> ShortLinks for ShortLinkService<S, M> {
    async fn create_short_link(&self, full_url: &str) -> Result<ShortLink, ShortLinkError> {
        validate_target(full_url)?;

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let link = ShortLink::new(self.minter.mint()?, full_url.to_string());
            match self.store.save(&link).await {
                Ok(()) => {
                    tracing::debug!("saved short link: {}", &link);
                    return Ok(link);
                }
                Err(DbError::Conflict(token)) => {
                    tracing::warn!("token collision on attempt {attempt}: {token}");
                }
                Err(e) => return Err(ShortLinkError::Persistence(e)),
            }
        }

        Err(ShortLinkError::TokensExhausted(MAX_MINT_ATTEMPTS))
    }

    async fn resolve_token(&self, token: &str) -> Result<String, ShortLinkError> {
        if token.is_empty() {
            return Err(ShortLinkError::EmptyToken);
        }

        match self.store.find_by_token(token).await {
            Ok(link) => Ok(link.target_url),
            Err(DbError::NotFound) => Err(ShortLinkError::NotFound),
            Err(e) => Err(ShortLinkError::Persistence(e)),
        }
    }
}
