//! Configuration loaded from the environment and an optional file.

use serde::Deserialize;

use crate::ops::auth::StaticAccessToken;
use crate::ops::hosts::drive::{DriveHost, DriveHostOptions};
use crate::prelude::*;

#[derive(Deserialize, Debug, Clone)]
pub struct DriveConnectionSpec {
    pub access_token: Option<String>,
    #[serde(flatten)]
    pub options: DriveHostOptions,
}

impl DriveConnectionSpec {
    /// Builds a drive host from this spec. Fails when no access token is
    /// configured or the upload chunk size is invalid.
    pub fn connect(&self) -> Result<DriveHost> {
        let token = self
            .access_token
            .clone()
            .ok_or_else(|| Error::protocol("no drive access token configured"))?;
        DriveHost::new(Arc::new(StaticAccessToken(token)), self.options.clone())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Settings {
    pub drive: Option<DriveConnectionSpec>,
}

impl Settings {
    /// Layers `hostbound.toml` (when present) under `HOSTBOUND_*`
    /// environment variables, e.g. `HOSTBOUND_DRIVE__ACCESS_TOKEN`.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("hostbound").required(false))
            .add_source(
                config::Environment::with_prefix("HOSTBOUND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
