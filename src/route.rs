//!
//! Route table
//! -----------
//! Read-mostly view of PD's region placement: which store leads each region
//! and which stores hold its followers, plus the dense virtual-id remapping
//! the graph is keyed by. A refresh builds a complete new `Route` value with
//! a bumped generation; nothing is patched in place, so a planner holding a
//! route never observes a half-applied refresh.
//!
//! Virtual ids are assigned by the enumeration order of `record_regions` in
//! the PD response and are only meaningful against the graph built while
//! this route generation was live. Callers pair one graph with one route
//! generation and rebuild the graph when they refresh.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::VirtualRegionId;
use crate::pd::{PdHttpClient, TableRegionsResponse};

/// Identifier of a data shard, as PD knows it.
pub type RegionId = u64;
/// Identifier of a storage node.
pub type StoreId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    generation: u64,
    store_ids: BTreeSet<StoreId>,
    virt_to_real: Vec<RegionId>,
    leader: HashMap<RegionId, StoreId>,
    followers: HashMap<RegionId, Vec<StoreId>>,
}

impl Route {
    /// Build a route from a decoded table-regions response. Virtual ids are
    /// the enumeration order of `record_regions`; followers exclude the peer
    /// whose peer id matches the leader's (learners count as followers).
    pub fn from_response(resp: &TableRegionsResponse, generation: u64) -> Route {
        let mut route = Route { generation, ..Default::default() };
        for region in &resp.record_regions {
            route.virt_to_real.push(region.region_id);
            route.leader.insert(region.region_id, region.leader.store_id);
            route.store_ids.insert(region.leader.store_id);
            let mut followers = Vec::new();
            for peer in &region.peers {
                route.store_ids.insert(peer.store_id);
                if peer.id != region.leader.id {
                    followers.push(peer.store_id);
                }
            }
            route.followers.insert(region.region_id, followers);
        }
        info!(
            target: "hotclump::route",
            "route generation {}: {} regions over {} stores",
            generation, route.virt_to_real.len(), route.store_ids.len()
        );
        route
    }

    /// Fetch the table-regions listing from PD and build a fresh route with
    /// the given generation.
    pub async fn refresh_from_pd(client: &PdHttpClient, generation: u64) -> Result<Route> {
        let resp = client.fetch_table_regions().await?;
        Ok(Route::from_response(&resp, generation))
    }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn region_count(&self) -> usize { self.virt_to_real.len() }

    /// All known store ids, ascending. The stable order here is what makes
    /// planning deterministic.
    pub fn all_stores(&self) -> Vec<StoreId> { self.store_ids.iter().copied().collect() }

    pub fn store_count(&self) -> usize { self.store_ids.len() }

    /// Virtual ids covered by this route: dense `0..region_count`.
    pub fn virtual_ids(&self) -> impl Iterator<Item = VirtualRegionId> {
        0..self.virt_to_real.len() as VirtualRegionId
    }

    pub fn to_real(&self, virt: VirtualRegionId) -> Result<RegionId> {
        self.virt_to_real.get(virt as usize).copied().ok_or(Error::UnknownRegion(virt))
    }

    pub fn leader_of(&self, virt: VirtualRegionId) -> Result<StoreId> {
        let real = self.to_real(virt)?;
        self.leader.get(&real).copied().ok_or(Error::UnknownRegion(real))
    }

    pub fn followers_of(&self, virt: VirtualRegionId) -> Result<Vec<StoreId>> {
        let real = self.to_real(virt)?;
        self.followers.get(&real).cloned().ok_or(Error::UnknownRegion(real))
    }

    /// Persist this route as an opaque snapshot blob.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snap = RouteSnapshot { version: SNAPSHOT_VERSION, route: self.clone() };
        let bytes = bincode::serialize(&snap).map_err(Error::snapshot_io)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes).map_err(Error::snapshot_io)?;
        std::fs::rename(&tmp, path).map_err(Error::snapshot_io)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Route> {
        let bytes = std::fs::read(path).map_err(Error::snapshot_io)?;
        let snap: RouteSnapshot = bincode::deserialize(&bytes).map_err(Error::snapshot_io)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotIo {
                reason: format!("unsupported route snapshot version {}", snap.version),
            });
        }
        Ok(snap.route)
    }
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct RouteSnapshot {
    version: u32,
    route: Route,
}
