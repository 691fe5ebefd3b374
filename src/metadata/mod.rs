use serde::Serialize;

pub mod request_client;
pub mod tvdb_api;

pub use request_client::LimitedRequestClient;

/// A show resolved against the remote catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ShowMetadata {
    pub id: u64,
    pub title: String,
    pub year: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeMetadata {
    pub season: u16,
    pub number: u16,
    pub title: Option<String>,
    pub aired: Option<String>,
    pub overview: Option<String>,
}

pub trait ShowMetadataProvider {
    /// Resolve a show by name, optionally narrowed by its release year
    #[allow(async_fn_in_trait)]
    fn search_show(
        &self,
        query: &str,
        year: Option<u16>,
    ) -> impl std::future::Future<Output = anyhow::Result<Option<ShowMetadata>>> + Send;

    /// Query for a single episode of a resolved show
    #[allow(async_fn_in_trait)]
    fn episode(
        &self,
        show_id: u64,
        season: u16,
        number: u16,
    ) -> impl std::future::Future<Output = anyhow::Result<Option<EpisodeMetadata>>> + Send;

    /// Provider identifier
    fn provider_identifier(&self) -> &'static str;
}
