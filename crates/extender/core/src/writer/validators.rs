//! Validator and stake refresh jobs.
//!
//! Both jobs are fed heights and run coalesced: a flush serves only the newest queued
//! height, since candidate state at an older height is already stale.

use super::Flush;
use crate::{ExtractionError, WriterError};
use async_trait::async_trait;
use extender_node_api::{CandidateResult, NodeApi};
use extender_primitives::{Stake, Validator, normalize_address, normalize_public_key};
use extender_storage::{AddressStorage, CoinStorage, ValidatorStorage};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    sync::Arc,
};
use tracing::{debug, warn};

/// Saves every address a candidate list references and returns their ids.
async fn candidate_address_ids<S: AddressStorage>(
    store: &S,
    candidates: &[CandidateResult],
) -> Result<HashMap<String, u64>, WriterError> {
    let mut addresses = BTreeSet::new();
    for candidate in candidates {
        addresses.insert(normalize_address(&candidate.owner_address).to_string());
        addresses.insert(normalize_address(&candidate.reward_address).to_string());
        for stake in candidate.stakes.iter().flatten() {
            addresses.insert(normalize_address(&stake.owner).to_string());
        }
    }
    let addresses: Vec<String> = addresses.into_iter().collect();
    store.save_addresses(&addresses).await?;
    Ok(store.find_address_ids(&addresses).await?)
}

fn lookup(ids: &HashMap<String, u64>, raw: &str) -> Result<u64, ExtractionError> {
    let address = normalize_address(raw);
    ids.get(address).copied().ok_or_else(|| ExtractionError::MissingAddress(address.to_string()))
}

fn validator_record(
    candidate: &CandidateResult,
    ids: &HashMap<String, u64>,
) -> Result<Validator, ExtractionError> {
    Ok(Validator {
        public_key: normalize_public_key(&candidate.pub_key).to_string(),
        owner_address_id: Some(lookup(ids, &candidate.owner_address)?),
        reward_address_id: Some(lookup(ids, &candidate.reward_address)?),
        status: Some(candidate.status),
        commission: Some(candidate.commission),
        total_stake: Some(candidate.total_stake.clone()),
    })
}

/// Refreshes status, commission, total stake and addresses of every candidate.
#[derive(Debug)]
pub struct ValidatorRefresher<N, S> {
    node: Arc<N>,
    store: Arc<S>,
}

impl<N, S> ValidatorRefresher<N, S> {
    /// Creates a new [`ValidatorRefresher`].
    pub const fn new(node: Arc<N>, store: Arc<S>) -> Self {
        Self { node, store }
    }
}

#[async_trait]
impl<N, S> Flush<u64> for ValidatorRefresher<N, S>
where
    N: NodeApi + 'static,
    S: AddressStorage + ValidatorStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<u64>) -> Result<(), WriterError> {
        let Some(height) = batch.into_iter().max() else {
            return Ok(());
        };
        let candidates = self.node.candidates(height, false).await?;
        let ids = candidate_address_ids(self.store.as_ref(), &candidates).await?;
        let validators = candidates
            .iter()
            .map(|candidate| validator_record(candidate, &ids))
            .collect::<Result<Vec<_>, _>>()?;

        self.store.save_validators(&validators).await?;
        debug!(target: "writer", height, count = validators.len(), "Refreshed validators");
        Ok(())
    }
}

/// Replaces the stakes of every candidate with the node's current view.
#[derive(Debug)]
pub struct StakeRefresher<N, S> {
    node: Arc<N>,
    store: Arc<S>,
    chunk_size: usize,
}

impl<N, S> StakeRefresher<N, S> {
    /// Creates a new [`StakeRefresher`].
    pub const fn new(node: Arc<N>, store: Arc<S>, chunk_size: usize) -> Self {
        Self { node, store, chunk_size }
    }
}

impl<N, S> StakeRefresher<N, S>
where
    S: ValidatorStorage + CoinStorage,
{
    async fn coin_id(
        &self,
        symbol: &str,
        cache: &mut HashMap<String, Option<u64>>,
    ) -> Result<Option<u64>, WriterError> {
        if let Some(id) = cache.get(symbol) {
            return Ok(*id);
        }
        let id = match self.store.find_coin_id(symbol).await {
            Ok(id) => Some(id),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };
        cache.insert(symbol.to_string(), id);
        Ok(id)
    }
}

#[async_trait]
impl<N, S> Flush<u64> for StakeRefresher<N, S>
where
    N: NodeApi + 'static,
    S: AddressStorage + ValidatorStorage + CoinStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<u64>) -> Result<(), WriterError> {
        let Some(height) = batch.into_iter().max() else {
            return Ok(());
        };
        let candidates = self.node.candidates(height, true).await?;
        let ids = candidate_address_ids(self.store.as_ref(), &candidates).await?;
        let validators = candidates
            .iter()
            .map(|candidate| validator_record(candidate, &ids))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.save_validators(&validators).await?;

        let mut coins = HashMap::new();
        let mut validator_ids = Vec::new();
        let mut stakes = Vec::new();
        for (candidate, validator) in candidates.iter().zip(&validators) {
            let validator_id = self.store.find_validator_id(&validator.public_key).await?;
            for stake in candidate.stakes.iter().flatten() {
                let Some(coin_id) = self.coin_id(&stake.coin, &mut coins).await? else {
                    warn!(target: "writer", coin = %stake.coin, "Skipping stake in unknown coin");
                    continue;
                };
                stakes.push(Stake {
                    validator_id,
                    owner_address_id: lookup(&ids, &stake.owner)?,
                    coin_id,
                    value: stake.value.clone(),
                    noah_value: stake.noah_value.clone(),
                });
            }
            validator_ids.push(validator_id);

            if stakes.len() >= self.chunk_size {
                self.store.replace_stakes(&validator_ids, &stakes).await?;
                validator_ids.clear();
                stakes.clear();
            }
        }
        if !validator_ids.is_empty() {
            self.store.replace_stakes(&validator_ids, &stakes).await?;
        }
        debug!(target: "writer", height, candidates = candidates.len(), "Refreshed stakes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extender_node_api::{MockNodeApi, StakeResult};
    use extender_storage::MemoryStore;

    fn candidate(key: &str, stakes: Option<Vec<StakeResult>>) -> CandidateResult {
        CandidateResult {
            reward_address: "NOAHxreward".into(),
            owner_address: "NOAHxowner".into(),
            total_stake: "100".into(),
            pub_key: format!("Np{key}"),
            commission: 10,
            stakes,
            status: 2,
        }
    }

    fn stake(owner: &str, coin: &str) -> StakeResult {
        StakeResult {
            owner: owner.into(),
            coin: coin.into(),
            value: "50".into(),
            noah_value: "50".into(),
        }
    }

    #[tokio::test]
    async fn validator_refresh_uses_newest_height() {
        let mut node = MockNodeApi::new();
        node.expect_candidates()
            .withf(|height, stakes| *height == 25 && !*stakes)
            .times(1)
            .returning(|_, _| Ok(vec![candidate("01", None)]));
        let store = Arc::new(MemoryStore::new());
        let refresher = ValidatorRefresher::new(Arc::new(node), store.clone());

        refresher.flush(vec![23, 25, 24]).await.unwrap();

        let validators = store.validators();
        assert_eq!(validators.len(), 1);
        assert_eq!(validators[0].public_key, "01");
        assert_eq!(validators[0].commission, Some(10));
        assert_eq!(validators[0].owner_address_id, store.address_id("owner"));
    }

    #[tokio::test]
    async fn stake_refresh_replaces_previous_stakes() {
        let mut node = MockNodeApi::new();
        let mut round = 0;
        node.expect_candidates().times(2).returning(move |_, _| {
            round += 1;
            let stakes = if round == 1 {
                vec![stake("NOAHxa", "NOAH"), stake("NOAHxb", "NOAH")]
            } else {
                vec![stake("NOAHxb", "NOAH"), stake("NOAHxc", "GONE")]
            };
            Ok(vec![candidate("01", Some(stakes))])
        });
        let store = Arc::new(MemoryStore::new());
        store.seed_coin("NOAH");
        let refresher = StakeRefresher::new(Arc::new(node), store.clone(), 1_000);

        refresher.flush(vec![12]).await.unwrap();
        assert_eq!(store.stakes().len(), 2);

        refresher.flush(vec![24]).await.unwrap();
        let stakes = store.stakes();
        assert_eq!(stakes.len(), 1);
        assert_eq!(Some(stakes[0].owner_address_id), store.address_id("b"));
    }
}
