//!
//! PD access layer
//! ---------------
//! Everything that talks to the placement director lives here: an HTTP
//! client for region and table-regions queries, a `pd-ctl` subprocess
//! backend for operator submission, and a scripted mock used by tests and
//! `--mock` runs. The dispatcher only sees the `PdBackend` trait, so the
//! invocation mechanism stays an injected dependency.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PdSettings;
use crate::dispatch::Op;
use crate::error::{Error, Result};
use crate::route::{RegionId, StoreId};

/// One peer replica as PD reports it. `role_name` is only present for
/// non-voting peers; absent means voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: u64,
    pub store_id: StoreId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

impl PeerInfo {
    pub fn is_learner(&self) -> bool { self.role_name.as_deref() == Some("Learner") }
}

/// Response of `GET /pd/api/v1/region/id/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionResponse {
    pub leader: PeerInfo,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

impl RegionResponse {
    /// Store ids of every peer that is not the leader, matched by peer id.
    pub fn follower_stores(&self) -> Vec<StoreId> {
        self.peers.iter().filter(|p| p.id != self.leader.id).map(|p| p.store_id).collect()
    }

    pub fn peer_at_store(&self, store: StoreId) -> Option<&PeerInfo> {
        self.peers.iter().find(|p| p.store_id == store)
    }
}

/// One element of the table-regions listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRegion {
    pub region_id: RegionId,
    pub leader: PeerInfo,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

/// Response of `GET /tables/{db}/{table}/regions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegionsResponse {
    #[serde(default)]
    pub record_regions: Vec<RecordRegion>,
}

/// Verdict of one operator submission. `Ok` at the transport level still
/// carries PD's accept/reject decision here.
#[derive(Debug, Clone)]
pub struct OperatorOutcome {
    pub accepted: bool,
    pub response: String,
}

#[async_trait]
pub trait PdBackend: Send + Sync {
    /// Submit one operator command. `Err` means the invocation itself failed
    /// (spawn or transport); a rejection by PD is an `Ok` with
    /// `accepted == false`.
    async fn submit_operator(&self, op: &Op) -> Result<OperatorOutcome>;

    /// Live placement of one region.
    async fn fetch_region(&self, region: RegionId) -> Result<RegionResponse>;
}

/// HTTP client for PD's JSON endpoints, with a per-request timeout.
pub struct PdHttpClient {
    base: String,
    db: String,
    table: String,
    client: reqwest::Client,
}

impl PdHttpClient {
    pub fn new(settings: &PdSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::PdFetch(e.to_string()))?;
        Ok(Self {
            base: settings.url.trim_end_matches('/').to_string(),
            db: settings.db.clone(),
            table: settings.table.clone(),
            client,
        })
    }

    pub async fn fetch_table_regions(&self) -> Result<TableRegionsResponse> {
        let url = format!("{}/tables/{}/{}/regions", self.base, self.db, self.table);
        self.get_json(&url).await
    }

    pub async fn fetch_region(&self, region: RegionId) -> Result<RegionResponse> {
        let url = format!("{}/pd/api/v1/region/id/{}", self.base, region);
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::PdFetch(format!("GET {}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::PdFetch(format!("GET {}: HTTP {}", url, status)));
        }
        let body = resp.text().await.map_err(|e| Error::PdFetch(format!("GET {}: {}", url, e)))?;
        serde_json::from_str(&body).map_err(|e| Error::PdDecode(format!("{}: {}", url, e)))
    }
}

/// Operator submission through the external `pd-ctl` binary, which is how
/// operators reach PD in production. Region queries go over HTTP.
pub struct CtlBackend {
    ctl_bin: String,
    pd_url: String,
    http: PdHttpClient,
}

impl CtlBackend {
    pub fn new(settings: &PdSettings) -> Result<Self> {
        Ok(Self {
            ctl_bin: settings.ctl_bin.clone(),
            pd_url: settings.url.clone(),
            http: PdHttpClient::new(settings)?,
        })
    }
}

#[async_trait]
impl PdBackend for CtlBackend {
    async fn submit_operator(&self, op: &Op) -> Result<OperatorOutcome> {
        let mut cmd = tokio::process::Command::new(&self.ctl_bin);
        cmd.arg("-u").arg(&self.pd_url).arg("operator").arg("add").args(op.ctl_args());
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::PdFetch(format!("spawn {}: {}", self.ctl_bin, e)))?;
        let mut response = String::from_utf8_lossy(&output.stdout).into_owned();
        response.push_str(&String::from_utf8_lossy(&output.stderr));
        // pd-ctl reports failures in the body more reliably than in the exit code
        let accepted = output.status.success() && !response.contains("Fail") && !response.contains("500");
        debug!(target: "hotclump::pd", "pd-ctl {:?}: accepted={} response={}", op.ctl_args(), accepted, response.trim());
        Ok(OperatorOutcome { accepted, response })
    }

    async fn fetch_region(&self, region: RegionId) -> Result<RegionResponse> {
        self.http.fetch_region(region).await
    }
}

/// Scripted PD stand-in. Submissions are recorded; outcomes and region
/// responses are served from queues loaded by the caller. With nothing
/// scripted every operator is accepted, which is what `--mock` runs use.
#[derive(Default)]
pub struct MockPd {
    submissions: Mutex<Vec<Op>>,
    outcomes: Mutex<VecDeque<OperatorOutcome>>,
    regions: Mutex<VecDeque<Option<RegionResponse>>>,
}

impl MockPd {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Queue a verdict for the next submission.
    pub fn push_outcome(&self, accepted: bool, response: &str) {
        self.outcomes.lock().push_back(OperatorOutcome { accepted, response: response.to_string() });
    }

    /// Queue a region response for the next `fetch_region`.
    pub fn push_region(&self, resp: RegionResponse) {
        self.regions.lock().push_back(Some(resp));
    }

    /// Queue a fetch failure for the next `fetch_region`.
    pub fn push_region_error(&self) {
        self.regions.lock().push_back(None);
    }

    /// Every operator submitted so far, in order.
    pub fn submissions(&self) -> Vec<Op> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl PdBackend for MockPd {
    async fn submit_operator(&self, op: &Op) -> Result<OperatorOutcome> {
        self.submissions.lock().push(op.clone());
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(OperatorOutcome { accepted: true, response: "mock: ok".to_string() });
        debug!(target: "hotclump::pd", "mock operator {:?} -> accepted={}", op.ctl_args(), outcome.accepted);
        Ok(outcome)
    }

    async fn fetch_region(&self, region: RegionId) -> Result<RegionResponse> {
        match self.regions.lock().pop_front() {
            Some(Some(resp)) => Ok(resp),
            Some(None) => Err(Error::PdFetch(format!("mock: region {} fetch failure", region))),
            None => {
                warn!(target: "hotclump::pd", "mock: no scripted response for region {}", region);
                Err(Error::PdFetch(format!("mock: no scripted response for region {}", region)))
            }
        }
    }
}
