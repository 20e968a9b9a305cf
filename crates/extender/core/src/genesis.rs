//! Import of the genesis state.

use crate::{ExtenderConfig, ExtenderError, ExtractionError, writer::priced_coin};
use extender_node_api::{GenesisResult, NodeApi};
use extender_primitives::{Balance, Stake, Validator, normalize_address, normalize_public_key};
use extender_storage::Store;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, warn};

/// Counts of records written by a genesis import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenesisReport {
    /// Addresses saved.
    pub addresses: usize,
    /// Coins saved, including the base coin.
    pub coins: usize,
    /// Validators saved.
    pub validators: usize,
    /// Balances saved.
    pub balances: usize,
    /// Stakes saved.
    pub stakes: usize,
}

/// Seeds an empty store from the node's genesis document.
#[derive(Debug)]
pub struct GenesisImporter<N, S> {
    node: Arc<N>,
    store: Arc<S>,
    config: ExtenderConfig,
}

impl<N, S> GenesisImporter<N, S>
where
    N: NodeApi,
    S: Store,
{
    /// Creates a new [`GenesisImporter`].
    pub const fn new(node: Arc<N>, store: Arc<S>, config: ExtenderConfig) -> Self {
        Self { node, store, config }
    }

    fn addresses(genesis: &GenesisResult) -> Vec<String> {
        let state = &genesis.app_state;
        let mut addresses = BTreeSet::new();
        for candidate in &state.candidates {
            addresses.insert(normalize_address(&candidate.reward_address).to_string());
            addresses.insert(normalize_address(&candidate.owner_address).to_string());
            for stake in &candidate.stakes {
                addresses.insert(normalize_address(&stake.owner).to_string());
            }
        }
        for account in &state.accounts {
            addresses.insert(normalize_address(&account.address).to_string());
        }
        addresses.into_iter().collect()
    }

    async fn coin_ids(&self) -> Result<HashMap<String, u64>, ExtenderError> {
        let mut ids = HashMap::new();
        for coin in self.store.all_coins().await? {
            let id = self.store.find_coin_id(&coin.symbol).await?;
            ids.insert(coin.symbol, id);
        }
        Ok(ids)
    }

    /// Downloads the genesis document and saves addresses, coins, validators, balances
    /// and stakes.
    pub async fn import(&self) -> Result<GenesisReport, ExtenderError> {
        info!(target: "genesis", "Downloading genesis");
        let genesis = self.node.genesis().await?;
        let state = &genesis.app_state;
        let mut report = GenesisReport::default();

        let addresses = Self::addresses(&genesis);
        for chunk in addresses.chunks(self.config.addr_chunk_size.max(1)) {
            self.store.save_addresses(chunk).await?;
        }
        let address_ids = self.store.find_address_ids(&addresses).await?;
        let address_id = |raw: &str| {
            let address = normalize_address(raw);
            address_ids
                .get(address)
                .copied()
                .ok_or_else(|| ExtractionError::MissingAddress(address.to_string()))
        };
        report.addresses = addresses.len();
        info!(target: "genesis", count = report.addresses, "Saved addresses");

        let base = &self.config.base_coin;
        let mut coins = vec![
            priced_coin(base.clone(), base.clone(), 100, "0".into(), "0".into())
                .map_err(ExtractionError::from)?,
        ];
        for coin in &state.coins {
            coins.push(
                priced_coin(
                    coin.symbol.clone(),
                    coin.name.clone(),
                    coin.crr,
                    coin.volume.clone(),
                    coin.reserve_balance.clone(),
                )
                .map_err(ExtractionError::from)?,
            );
        }
        self.store.save_coins(&coins).await?;
        report.coins = coins.len();
        info!(target: "genesis", count = report.coins, "Saved coins");
        let coin_ids = self.coin_ids().await?;

        let mut validators = Vec::with_capacity(state.candidates.len());
        for candidate in &state.candidates {
            validators.push(Validator {
                public_key: normalize_public_key(&candidate.pub_key).to_string(),
                owner_address_id: Some(address_id(&candidate.owner_address)?),
                reward_address_id: Some(address_id(&candidate.reward_address)?),
                status: Some(candidate.status),
                commission: Some(candidate.commission),
                total_stake: Some(candidate.total_noah_stake.clone()),
            });
        }
        self.store.save_validators(&validators).await?;
        report.validators = validators.len();
        info!(target: "genesis", count = report.validators, "Saved validators");

        for accounts in state.accounts.chunks(self.config.addr_chunk_size.max(1)) {
            let mut ids = Vec::with_capacity(accounts.len());
            let mut balances = Vec::new();
            for account in accounts {
                let address_id = address_id(&account.address)?;
                ids.push(address_id);
                for balance in &account.balance {
                    let Some(coin_id) = coin_ids.get(&balance.coin).copied() else {
                        warn!(target: "genesis", coin = %balance.coin, "Skipping balance of unknown coin");
                        continue;
                    };
                    balances.push(Balance { address_id, coin_id, value: balance.value.clone() });
                }
            }
            self.store.replace_balances(&ids, &balances).await?;
            report.balances += balances.len();
        }
        info!(target: "genesis", count = report.balances, "Saved balances");

        for candidate in &state.candidates {
            let validator_id =
                self.store.find_validator_id(normalize_public_key(&candidate.pub_key)).await?;
            let mut stakes = Vec::with_capacity(candidate.stakes.len());
            for stake in &candidate.stakes {
                let Some(coin_id) = coin_ids.get(&stake.coin).copied() else {
                    warn!(target: "genesis", coin = %stake.coin, "Skipping stake in unknown coin");
                    continue;
                };
                stakes.push(Stake {
                    validator_id,
                    owner_address_id: address_id(&stake.owner)?,
                    coin_id,
                    value: stake.value.clone(),
                    noah_value: stake.noah_value.clone(),
                });
            }
            self.store.replace_stakes(&[validator_id], &stakes).await?;
            report.stakes += stakes.len();
        }
        info!(target: "genesis", count = report.stakes, "Saved stakes");

        Ok(report)
    }
}
