//! Cached account state shared between workers.
//!
//! The analysis worker must never block on a broker call, so it sizes
//! trades against the snapshot the execution worker last fetched. Stale
//! by at most one fill cycle, which the risk checks tolerate.

use std::sync::{Arc, RwLock};

use crate::exchange::types::{AccountSnapshot, BrokerPosition};

#[derive(Default)]
struct CachedAccount {
    account: Option<AccountSnapshot>,
    positions: Vec<BrokerPosition>,
}

#[derive(Clone, Default)]
pub struct AccountCache {
    inner: Arc<RwLock<CachedAccount>>,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, account: AccountSnapshot, positions: Vec<BrokerPosition>) {
        let mut inner = self.inner.write().unwrap();
        inner.account = Some(account);
        inner.positions = positions;
    }

    pub fn account(&self) -> Option<AccountSnapshot> {
        self.inner.read().unwrap().account.clone()
    }

    pub fn positions(&self) -> Vec<BrokerPosition> {
        self.inner.read().unwrap().positions.clone()
    }
}
