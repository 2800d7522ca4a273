//! Public image host.
//!
//! Airtable fetches attachments from a URL, so exported images must be
//! reachable somewhere public first. The images directory is expected to be
//! pushed to a GitHub repository and served from `raw.githubusercontent.com`.

use std::time::Duration;
use ureq::Agent;

use crate::config::HostConfig;
use crate::errors::MigrateError;

const RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Builds public URLs for exported image files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHost {
    base: String,
}

impl ImageHost {
    /// Host from `[host]`; owner and repo are required.
    pub fn from_config(config: &HostConfig) -> Result<Self, MigrateError> {
        let owner = config.owner.as_deref().ok_or_else(|| MigrateError::MissingSetting {
            setting: "host.owner".to_string(),
        })?;
        let repo = config.repo.as_deref().ok_or_else(|| MigrateError::MissingSetting {
            setting: "host.repo".to_string(),
        })?;

        let mut base = format!(
            "{}/{}/{}/{}",
            RAW_BASE,
            encode_path(owner),
            encode_path(repo),
            encode_path(&config.branch)
        );
        let path = encode_path(&config.image_path);
        if !path.is_empty() {
            base.push('/');
            base.push_str(&path);
        }
        Ok(Self { base })
    }

    /// Host rooted at an arbitrary base URL.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base, urlencoding::encode(filename))
    }

    /// Whether `url` answers a HEAD request with a non-error status.
    pub fn is_reachable(url: &str, timeout: Duration) -> bool {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        let agent = Agent::new_with_config(config);

        match agent.head(url).call() {
            Ok(response) => response.status().as_u16() < 400,
            Err(_) => false,
        }
    }
}

/// Percent-encode each `/`-separated segment, dropping empty ones.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_config() -> HostConfig {
        HostConfig {
            owner: Some("acme".to_string()),
            repo: Some("notion-export".to_string()),
            ..HostConfig::default()
        }
    }

    #[test]
    fn test_raw_github_url() {
        let host = ImageHost::from_config(&host_config()).unwrap();
        assert_eq!(
            host.url_for("281fc271_photo final.png"),
            "https://raw.githubusercontent.com/acme/notion-export/main/notion_export/images/281fc271_photo%20final.png"
        );
    }

    #[test]
    fn test_segments_are_encoded() {
        let config = HostConfig {
            image_path: "exports/Bilder & Foton".to_string(),
            ..host_config()
        };
        let host = ImageHost::from_config(&config).unwrap();
        assert!(host
            .url_for("a.png")
            .ends_with("/main/exports/Bilder%20%26%20Foton/a.png"));
    }

    #[test]
    fn test_missing_owner_names_setting() {
        let err = ImageHost::from_config(&HostConfig::default()).unwrap_err();
        assert!(err.to_string().contains("host.owner"));
    }

    #[test]
    fn test_with_base() {
        let host = ImageHost::with_base("https://cdn.example.com/img/");
        assert_eq!(host.url_for("x.png"), "https://cdn.example.com/img/x.png");
    }

    #[test]
    fn test_unreachable_host_is_not_reachable() {
        assert!(!ImageHost::is_reachable("http://127.0.0.1:9/none.png", Duration::from_millis(500)));
    }
}
