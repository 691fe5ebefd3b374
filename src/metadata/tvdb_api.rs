use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{EpisodeMetadata, LimitedRequestClient, ShowMetadata, ShowMetadataProvider};

/// TheTVDB v4 client.
///
/// The bearer token obtained from `/login` is persisted so later runs skip the
/// login round-trip. Episode lists are fetched once per series and cached both
/// on disk (`<cache>/<id>.json`) and in memory.
#[derive(Debug)]
pub struct TvdbApi {
    client: LimitedRequestClient,
    http: Client,
    base_url: Url,
    api_key: String,
    token: Mutex<Option<String>>,
    token_path: PathBuf,
    cache_path: PathBuf,
    series_cache: Mutex<HashMap<u64, Arc<TvdbSeriesEpisodes>>>,
}

impl TvdbApi {
    pub const RATE_LIMIT: usize = 10;
    pub const API_URL: &'static str = "https://api4.thetvdb.com/v4";

    pub fn new(api_key: String, token_path: PathBuf, cache_path: PathBuf) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .expect("build to succeed");
        let client = LimitedRequestClient::new(http.clone(), Self::RATE_LIMIT, Duration::from_secs(1));
        let base_url = Url::parse(Self::API_URL).expect("url to parse");
        let token = read_token_file(&token_path);
        Self {
            client,
            http,
            base_url,
            api_key,
            token: Mutex::new(token),
            token_path,
            cache_path,
            series_cache: Mutex::new(HashMap::new()),
        }
    }

    // https://api4.thetvdb.com/v4/login
    async fn login(&self) -> anyhow::Result<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map(|mut p| {
                p.push("login");
            })
            .expect("base url to have segments");
        let body = serde_json::json!({ "apikey": self.api_key });
        let req = self.http.post(url).json(&body).build()?;
        let res: TvdbResponse<TvdbToken> = self.client.request(req).await?;
        let token = res.data.token.clone();
        if let Err(e) = self.persist_token(&res) {
            tracing::warn!("Failed to persist token file: {e}");
        }
        *self.token.lock().unwrap() = Some(token.clone());
        tracing::debug!("Obtained fresh TVDB token");
        Ok(token)
    }

    fn persist_token(&self, res: &TvdbResponse<TvdbToken>) -> anyhow::Result<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.token_path, serde_json::to_string_pretty(res)?)?;
        Ok(())
    }

    async fn bearer_token(&self) -> anyhow::Result<String> {
        let current = self.token.lock().unwrap().clone();
        match current {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    /// Authenticated GET. A 401 means the persisted token expired, so log in
    /// again and retry once.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        let token = self.bearer_token().await?;
        let req = self.http.get(url.clone()).bearer_auth(&token).build()?;
        let mut response = self.client.request_raw(req).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Token rejected, logging in again");
            let token = self.login().await?;
            let req = self.http.get(url.clone()).bearer_auth(&token).build()?;
            response = self.client.request_raw(req).await?;
        }
        if !response.status().is_success() {
            anyhow::bail!("provider responded with status {} for {url}", response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to deserialize response from {url}"))
    }

    // https://api4.thetvdb.com/v4/search?query=halo&type=series&year=2022
    async fn search_series(
        &self,
        query: &str,
        year: Option<u16>,
    ) -> anyhow::Result<Vec<TvdbSearchResult>> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map(|mut p| {
                p.push("search");
            })
            .expect("base url to have segments");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query).append_pair("type", "series");
            if let Some(year) = year {
                pairs.append_pair("year", &year.to_string());
            }
        }
        let res: TvdbResponse<Vec<TvdbSearchResult>> = self.get_json(url).await?;
        Ok(res.data)
    }

    // https://api4.thetvdb.com/v4/series/366524/episodes/default/eng?page=0
    async fn series_episodes(&self, id: u64) -> anyhow::Result<Arc<TvdbSeriesEpisodes>> {
        if let Some(cached) = self.series_cache.lock().unwrap().get(&id).cloned() {
            return Ok(cached);
        }
        let cache_file = self.cache_path.join(format!("{id}.json"));
        if let Ok(raw) = fs::read_to_string(&cache_file) {
            match serde_json::from_str::<TvdbResponse<TvdbSeriesEpisodes>>(&raw) {
                Ok(res) => {
                    tracing::trace!("Cache hit for series {id}");
                    let data = Arc::new(res.data);
                    self.series_cache.lock().unwrap().insert(id, data.clone());
                    return Ok(data);
                }
                Err(e) => {
                    tracing::warn!(
                        "Discarding malformed cache file {}: {e}",
                        cache_file.display()
                    );
                }
            }
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map(|mut p| {
                p.push("series");
                p.push(&id.to_string());
                p.push("episodes");
                p.push("default");
                p.push("eng");
            })
            .expect("base url to have segments");
        url.query_pairs_mut().append_pair("page", "0");
        let res: TvdbResponse<TvdbSeriesEpisodes> = self.get_json(url).await?;
        if let Err(e) = persist_series(&cache_file, &res) {
            tracing::warn!("Failed to write cache file {}: {e}", cache_file.display());
        }
        let data = Arc::new(res.data);
        self.series_cache.lock().unwrap().insert(id, data.clone());
        Ok(data)
    }
}

impl ShowMetadataProvider for TvdbApi {
    async fn search_show(
        &self,
        query: &str,
        year: Option<u16>,
    ) -> anyhow::Result<Option<ShowMetadata>> {
        let results = self.search_series(query, year).await?;
        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(first.try_into()?))
    }

    async fn episode(
        &self,
        show_id: u64,
        season: u16,
        number: u16,
    ) -> anyhow::Result<Option<EpisodeMetadata>> {
        let series = self.series_episodes(show_id).await?;
        Ok(series
            .episodes
            .iter()
            .find(|e| e.season_number == season && e.number == number)
            .map(|e| EpisodeMetadata {
                season,
                number,
                title: e.name.clone(),
                aired: e.aired.clone(),
                overview: e.overview.clone(),
            }))
    }

    fn provider_identifier(&self) -> &'static str {
        "tvdb"
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<TvdbResponse<TvdbToken>>(&raw) {
        Ok(res) => {
            tracing::trace!("Loaded token from {}", path.display());
            Some(res.data.token)
        }
        Err(e) => {
            tracing::warn!("Ignoring malformed token file {}: {e}", path.display());
            None
        }
    }
}

fn persist_series(path: &Path, res: &TvdbResponse<TvdbSeriesEpisodes>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(res)?)?;
    Ok(())
}

impl TryFrom<TvdbSearchResult> for ShowMetadata {
    type Error = anyhow::Error;

    fn try_from(val: TvdbSearchResult) -> Result<Self, Self::Error> {
        Ok(ShowMetadata {
            id: val.tvdb_id.parse().context("tvdb_id is not a number")?,
            title: val.name,
            year: val.year.as_deref().and_then(|y| y.parse().ok()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TvdbResponse<T> {
    #[serde(default)]
    status: Option<String>,
    data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TvdbToken {
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TvdbSearchResult {
    tvdb_id: String,
    name: String,
    #[serde(default)]
    year: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvdbSeriesEpisodes {
    #[serde(default)]
    series: Option<TvdbSeriesBase>,
    episodes: Vec<TvdbEpisode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvdbSeriesBase {
    id: u64,
    name: String,
    #[serde(default)]
    year: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvdbEpisode {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    aired: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    number: u16,
    season_number: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIES_PAYLOAD: &str = r#"{
      "status": "success",
      "data": {
        "series": { "id": 121361, "name": "Mr. Robot", "year": "2015" },
        "episodes": [
          {
            "id": 1,
            "name": "eps1.0_hellofriend.mov",
            "aired": "2015-06-24",
            "overview": "Elliot is recruited.",
            "number": 1,
            "seasonNumber": 1
          },
          {
            "id": 2,
            "name": "eps1.1_ones-and-zer0es.mpeg",
            "aired": "2015-07-01",
            "overview": null,
            "number": 2,
            "seasonNumber": 1
          }
        ]
      }
    }"#;

    fn api_with_cache(dir: &Path) -> TvdbApi {
        TvdbApi::new(
            "key".to_string(),
            dir.join("token.json"),
            dir.join("cache"),
        )
    }

    #[tokio::test]
    async fn episode_lookup_from_cache_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).expect("mkdir");
        fs::write(cache.join("121361.json"), SERIES_PAYLOAD).expect("seed cache");

        let api = api_with_cache(dir.path());
        let episode = api
            .episode(121361, 1, 2)
            .await
            .expect("cache satisfies the request")
            .expect("episode is listed");
        assert_eq!(episode.title.as_deref(), Some("eps1.1_ones-and-zer0es.mpeg"));
        assert_eq!(episode.overview, None);

        let missing = api.episode(121361, 2, 1).await.expect("cache hit");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn malformed_cache_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).expect("mkdir");
        fs::write(cache.join("5.json"), "{ not json").expect("seed cache");

        let api = api_with_cache(dir.path());
        // Fetching falls through to the network, which fails with a bogus key.
        assert!(api.episode(5, 1, 1).await.is_err());
    }

    #[test]
    fn token_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token_path = dir.path().join("token.json");
        fs::write(
            &token_path,
            r#"{ "status": "success", "data": { "token": "abc" } }"#,
        )
        .expect("seed token");
        assert_eq!(read_token_file(&token_path), Some("abc".to_string()));
        assert_eq!(read_token_file(&dir.path().join("missing.json")), None);
    }
}
