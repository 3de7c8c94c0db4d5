//! OAuth token store for the Fleet API
//!
//! The token itself is acquired out-of-band (authorization-code callback on
//! the operator's web host); this module only reads the stored grant and
//! performs the one-shot refresh the executor is allowed per command. Tokens
//! live as JSON files in a directory: `tesla_token_latest.json` plus
//! timestamped rotated copies, pruned to the newest few.

use crate::config::TeslaConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LATEST_TOKEN_FILE: &str = "tesla_token_latest.json";
const MAX_ROTATED_TOKEN_FILES: usize = 3;
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Stored OAuth grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Source of access tokens for the command executor.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Current access token, if one is stored.
    async fn access_token(&self) -> Option<String>;

    /// Exchange the refresh token for a new grant and persist it.
    async fn refresh(&self) -> Result<()>;
}

/// File-backed token store using the refresh grant of the Fleet OAuth
/// endpoint.
pub struct FileTokenStore {
    config: TeslaConfig,
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl FileTokenStore {
    pub fn new(config: TeslaConfig) -> Result<Self> {
        let logger = get_logger("token");
        let client = reqwest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            client,
            logger,
        })
    }

    fn latest_path(&self) -> PathBuf {
        Path::new(&self.config.token_dir).join(LATEST_TOKEN_FILE)
    }

    async fn load_grant(&self) -> Result<TokenGrant> {
        let contents = tokio::fs::read_to_string(self.latest_path())
            .await
            .map_err(|e| HeliosError::auth(format!("Token file unreadable: {}", e)))?;
        let grant: TokenGrant = serde_json::from_str(&contents)?;
        if grant.access_token.is_empty() {
            return Err(HeliosError::auth("Stored grant has no access token"));
        }
        Ok(grant)
    }

    async fn save_grant(&self, body: &str) -> Result<()> {
        let dir = Path::new(&self.config.token_dir);
        tokio::fs::create_dir_all(dir).await?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let rotated = dir.join(format!("tesla_token_{}.json", stamp));
        tokio::fs::write(&rotated, body).await?;
        tokio::fs::write(self.latest_path(), body).await?;

        self.prune_rotated(dir).await?;
        Ok(())
    }

    /// Keep only the newest rotated token files.
    async fn prune_rotated(&self, dir: &Path) -> Result<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut rotated: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("tesla_token_")
                && name.ends_with(".json")
                && name != LATEST_TOKEN_FILE
            {
                let modified = entry
                    .metadata()
                    .await?
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                rotated.push((entry.path(), modified));
            }
        }
        rotated.sort_by_key(|(_, modified)| *modified);
        while rotated.len() > MAX_ROTATED_TOKEN_FILES {
            let (path, _) = rotated.remove(0);
            self.logger
                .debug(&format!("Pruning old token file {}", path.display()));
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn access_token(&self) -> Option<String> {
        match self.load_grant().await {
            Ok(grant) => Some(grant.access_token),
            Err(e) => {
                self.logger.error(&format!("No usable access token: {}", e));
                None
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        let grant = self.load_grant().await?;
        if grant.refresh_token.is_empty() {
            return Err(HeliosError::auth("Stored grant has no refresh token"));
        }

        self.logger.info("Refreshing Fleet API access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", grant.refresh_token.as_str()),
            ("scope", self.config.scope.as_str()),
            ("audience", self.config.audience.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(HeliosError::auth(format!(
                "Token refresh rejected: {} - {}",
                status, body
            )));
        }

        // Validate the payload before persisting it
        let new_grant: TokenGrant = serde_json::from_str(&body)?;
        if new_grant.access_token.is_empty() {
            return Err(HeliosError::auth("Refresh response carried no access token"));
        }

        self.save_grant(&body).await?;
        self.logger.info("Access token refreshed and saved");
        Ok(())
    }
}
