use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote snapshot store.
///
/// The store is a small HTTP API: `GET {base}/snapshots` returns the
/// server's most recent records, `POST {base}/snapshots` upserts one
/// record keyed by bucket. Both calls are best-effort from the engine's
/// perspective; callers log failures and carry on, and nothing retries
/// or blocks interactive work on these requests.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base: Url,
    client: Client,
}

impl RemoteStore {
    pub fn new(base: impl AsRef<str>) -> Result<Self> {
        let base = Url::parse(base.as_ref())?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(RemoteStore { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetch the remote snapshot list.
    pub async fn fetch(&self) -> Result<Vec<Snapshot>> {
        let url = self.snapshots_url()?;
        log::debug!("fetching remote snapshots from {url}");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let snapshots = response.json::<Vec<Snapshot>>().await?;
        Ok(snapshots)
    }

    /// Upsert one snapshot record remotely. Posting the same bucket
    /// twice overwrites it server-side.
    pub async fn push(&self, snapshot: &Snapshot) -> Result<()> {
        let url = self.snapshots_url()?;
        log::debug!("pushing snapshot {} to {url}", snapshot.bucket);
        self.client
            .post(url)
            .json(snapshot)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn snapshots_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::UrlParse(format!("base URL cannot carry paths: {}", self.base)))?
            .pop_if_empty()
            .push("snapshots");
        Ok(url)
    }
}
