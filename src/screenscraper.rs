use super::SimpleResult;
use super::config::ScreenScraperCredentials;
use super::model::*;
use super::rate_limiter::LaneRateLimiter;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

pub const SCREENSCRAPER_BASE_URL: &str = "https://api.screenscraper.fr/api2";

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Response bodies that signal a transient server condition. ScreenScraper
/// answers HTTP 200 for most of these, so the body has to be inspected.
const BUSY_PATTERNS: [&str; 4] = [
    "API closed",
    "API fermé",
    "maximum threads",
    "server is overloaded",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub url: String,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScrapedMedia {
    pub box_front: Option<MediaRef>,
    pub box_back: Option<MediaRef>,
    pub screenshot: Option<MediaRef>,
    pub video: Option<MediaRef>,
}

#[derive(Debug, Clone)]
pub struct ScrapedGame {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub media: ScrapedMedia,
}

#[derive(Debug, Default)]
pub struct GameQuery {
    pub system_id: u32,
    pub rom_name: String,
    pub rom_size: Option<u64>,
    pub crc: Option<String>,
    pub sha1: Option<String>,
}

pub struct ScreenScraperClient {
    client: reqwest::Client,
    base_url: String,
    credentials: ScreenScraperCredentials,
}

impl ScreenScraperClient {
    pub fn new(credentials: ScreenScraperCredentials) -> SimpleResult<Self> {
        Self::with_base_url(credentials, SCREENSCRAPER_BASE_URL)
    }

    pub fn with_base_url(
        credentials: ScreenScraperCredentials,
        base_url: &str,
    ) -> SimpleResult<Self> {
        let client = try_with!(
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(60))
                .build(),
            "Failed to build API client"
        );
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Validate credentials and read the account's thread allowance.
    pub async fn user_infos(&self) -> SimpleResult<SsUserJson> {
        let url = format!("{}/ssuserInfos.php", self.base_url);
        let text = try_with!(
            try_with!(
                self.client
                    .get(&url)
                    .query(&self.base_params())
                    .send()
                    .await,
                "Failed to query user infos"
            )
            .text()
            .await,
            "Failed to read user infos"
        );
        if text.contains("Erreur de login") || text.contains("Identifiants") {
            bail!("Invalid ScreenScraper credentials");
        }
        let parsed: UserInfosJson = try_with!(
            serde_json::from_str(&text),
            "Failed to parse user infos: {}",
            truncate(&text)
        );
        Ok(parsed.response.ssuser)
    }

    /// Look up one game. Each attempt waits for a rate limiter lane;
    /// transient failures back off exponentially for up to three attempts.
    pub async fn game_infos(
        &self,
        limiter: &LaneRateLimiter,
        query: &GameQuery,
        cancellation: &CancellationToken,
    ) -> SimpleResult<ScrapedGame> {
        let mut last_error = String::from("Retries exhausted");
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt - 1));
                debug!("Retrying lookup for \"{}\" after {:?}", query.rom_name, backoff);
                tokio::select! {
                    _ = cancellation.cancelled() => bail!("Cancelled"),
                    _ = sleep(backoff) => (),
                }
            }
            tokio::select! {
                _ = cancellation.cancelled() => bail!("Cancelled"),
                _ = limiter.wait() => (),
            }

            match self.game_infos_once(query, cancellation).await {
                Ok(game) => return Ok(game),
                Err(ApiError::Permanent(message)) => bail!("{}", message),
                Err(ApiError::Retryable(message)) => last_error = message,
                Err(ApiError::Cancelled) => bail!("Cancelled"),
            }
        }
        bail!("{}", last_error)
    }

    async fn game_infos_once(
        &self,
        query: &GameQuery,
        cancellation: &CancellationToken,
    ) -> Result<ScrapedGame, ApiError> {
        let url = format!("{}/jeuInfos.php", self.base_url);
        let mut params = self.base_params();
        params.push((
            "systemeid",
            query.system_id.to_string(),
        ));
        params.push(("romnom", query.rom_name.clone()));
        params.push(("romtype", String::from("rom")));
        if let Some(size) = query.rom_size {
            params.push(("romtaille", size.to_string()));
        }
        if let Some(crc) = &query.crc {
            params.push(("crc", crc.clone()));
        }
        if let Some(sha1) = &query.sha1 {
            params.push(("sha1", sha1.clone()));
        }

        let response = tokio::select! {
            _ = cancellation.cancelled() => return Err(ApiError::Cancelled),
            response = self.client.get(&url).query(&params).send() => response
                .map_err(|error| ApiError::Retryable(format!("Request failed: {}", error)))?,
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ApiError::Retryable(format!(
                "Server returned HTTP {}",
                status.as_u16()
            )));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::Permanent(String::from(
                "ScreenScraper rejected the credentials",
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|error| ApiError::Retryable(format!("Failed to read body: {}", error)))?;

        if text.trim().is_empty() {
            return Err(ApiError::Retryable(String::from("Empty response")));
        }
        if BUSY_PATTERNS
            .iter()
            .any(|pattern| text.contains(pattern))
        {
            return Err(ApiError::Retryable(format!(
                "Server busy: {}",
                truncate(&text)
            )));
        }
        if looks_like_html(&text) {
            return Err(ApiError::Retryable(String::from(
                "Server returned an HTML page instead of JSON",
            )));
        }
        if text.contains("non trouvé") || text.contains("not found") {
            return Err(ApiError::Permanent(format!(
                "Game not found: \"{}\"",
                query.rom_name
            )));
        }

        let parsed: JeuInfosJson = serde_json::from_str(&text).map_err(|error| {
            ApiError::Retryable(format!(
                "Failed to parse game infos: {} ({})",
                error,
                truncate(&text)
            ))
        })?;
        Ok(normalize_game(&parsed.response.jeu))
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("devid", self.credentials.dev_id.clone()),
            ("devpassword", self.credentials.dev_password.clone()),
            ("softname", self.credentials.soft_name.clone()),
            ("output", String::from("json")),
        ];
        if let Some(user_id) = &self.credentials.user_id {
            params.push(("ssid", user_id.clone()));
        }
        if let Some(user_password) = &self.credentials.user_password {
            params.push(("sspassword", user_password.clone()));
        }
        params
    }
}

enum ApiError {
    Retryable(String),
    Permanent(String),
    Cancelled,
}

/// Flatten the API response into one representative per medium, preferring
/// world then US region variants.
pub fn normalize_game(jeu: &JeuJson) -> ScrapedGame {
    let name = pick_by_region(&jeu.noms, |nom| nom.region.as_deref())
        .map(|nom| nom.text.clone())
        .unwrap_or_default();
    ScrapedGame {
        id: jeu.id.parse().unwrap_or_default(),
        name,
        region: jeu.region.clone(),
        media: ScrapedMedia {
            box_front: pick_media(&jeu.medias, &["box-2D"]),
            box_back: pick_media(&jeu.medias, &["box-2D-back"]),
            screenshot: pick_media(&jeu.medias, &["ss", "ss-game"]),
            video: pick_media(&jeu.medias, &["video-normalized", "video"]),
        },
    }
}

fn pick_media(medias: &[MediaJson], media_types: &[&str]) -> Option<MediaRef> {
    let candidates: Vec<&MediaJson> = media_types
        .iter()
        .flat_map(|media_type| {
            medias
                .iter()
                .filter(move |media| media.media_type == *media_type)
        })
        .collect();
    let chosen = candidates
        .iter()
        .find(|media| media.region.as_deref() == Some("wor"))
        .or_else(|| {
            candidates
                .iter()
                .find(|media| media.region.as_deref() == Some("us"))
        })
        .or_else(|| candidates.first())?;
    Some(MediaRef {
        url: chosen.url.clone(),
        format: chosen
            .format
            .clone()
            .unwrap_or_else(|| String::from("png")),
    })
}

fn pick_by_region<'a, T>(
    items: &'a [T],
    region: impl Fn(&T) -> Option<&str>,
) -> Option<&'a T> {
    items
        .iter()
        .find(|item| region(item) == Some("wor"))
        .or_else(|| items.iter().find(|item| region(item) == Some("us")))
        .or_else(|| items.first())
}

fn looks_like_html(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") || trimmed.starts_with("<HTML")
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod test_normalize;
