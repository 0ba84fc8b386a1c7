//! Credential provider seam.
//!
//! Hosts that talk to authenticated APIs obtain bearer tokens through
//! this trait and never learn how the token was acquired. Any acquisition
//! mechanism satisfies the contract: device code, refresh token, service
//! account, or a token minted out of band.

use async_trait::async_trait;

use crate::prelude::*;

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn get_access_token(&self) -> Result<String>;
}

/// A pre-acquired token handed in at construction time.
pub struct StaticAccessToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticAccessToken {
    async fn get_access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
