//! Stake custody
//!
//! Production stake accounting for relay nodes. The asset itself lives on
//! the external asset ledger; this component decides what moves in and out
//! of the custody account and keeps the global totals in step:
//! - Stake deposits pulled through the owner's allowance
//! - Full stake return on voluntary deactivation
//! - Percentage slashing into the community fee pool
//! - Forfeiture of the remainder on forced deactivation
//! - Reward-pool funding and withdrawal of unreserved custody funds

use relaynet_core::{AccountId, Amount};
use tracing::{error, info};

use crate::error::{LedgerError, Result};
use crate::transaction::{Transaction, TransferKind};
use crate::types::{GlobalState, RelayNode};

#[derive(Debug, Clone)]
pub struct StakeLedger {
    slash_percentage: u8,
}

impl StakeLedger {
    pub fn new(slash_percentage: u8) -> Self {
        Self { slash_percentage }
    }

    pub fn slash_percentage(&self) -> u8 {
        self.slash_percentage
    }

    /// Move `amount` from the owner's balance into custody
    pub fn deposit_stake(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        tx.pull_into_custody(TransferKind::StakeDeposit, account, amount)?;

        let mut globals = tx.globals()?;
        globals.total_staked += amount;
        tx.put_globals(&globals)?;
        Ok(())
    }

    /// Return stake from custody.
    ///
    /// Custody always holds at least `total_staked`; if it cannot cover a
    /// return the books are corrupt and the error is fatal.
    pub fn return_stake(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let available = tx.custody_balance();
        let mut globals = tx.globals()?;
        if available < amount || globals.total_staked < amount {
            error!(
                account = %account,
                available,
                requested = amount,
                total_staked = globals.total_staked,
                "Custody cannot cover stake return"
            );
            return Err(LedgerError::CustodyInsolvent {
                account: *account,
                available: available.min(globals.total_staked),
                requested: amount,
            });
        }

        tx.pay_from_custody(TransferKind::StakeReturn, account, amount);
        globals.total_staked -= amount;
        tx.put_globals(&globals)?;
        Ok(())
    }

    /// Slash the configured percentage of a node's stake into the fee pool.
    ///
    /// Returns the slashed amount. Funds stay in custody.
    pub fn slash(&self, tx: &mut Transaction<'_>, node: &mut RelayNode) -> Result<Amount> {
        let slashed = node.staked_amount * self.slash_percentage as Amount / 100;
        node.staked_amount -= slashed;

        let mut globals = tx.globals()?;
        globals.total_staked = globals.total_staked.saturating_sub(slashed);
        globals.fee_pool_total += slashed;
        tx.put_globals(&globals)?;

        info!(
            account = %node.account,
            slashed,
            remaining = node.staked_amount,
            "Stake slashed"
        );
        Ok(slashed)
    }

    /// Route the node's entire remaining stake to the fee pool
    pub fn forfeit(&self, tx: &mut Transaction<'_>, node: &mut RelayNode) -> Result<Amount> {
        let forfeited = node.staked_amount;
        node.staked_amount = 0;

        let mut globals = tx.globals()?;
        globals.total_staked = globals.total_staked.saturating_sub(forfeited);
        globals.fee_pool_total += forfeited;
        tx.put_globals(&globals)?;
        Ok(forfeited)
    }

    /// Custody funds not backing stake: the reward pool
    pub fn unreserved_balance(&self, tx: &Transaction<'_>, globals: &GlobalState) -> Amount {
        tx.custody_balance().saturating_sub(globals.total_staked)
    }

    /// Reward pool available for new payouts, excluding promised fee entitlements
    pub fn spendable_rewards(&self, tx: &Transaction<'_>, globals: &GlobalState) -> Amount {
        self.unreserved_balance(tx, globals)
            .saturating_sub(globals.pending_fee_total)
    }

    pub fn fund_reward_pool(
        &self,
        tx: &mut Transaction<'_>,
        from: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("funding amount must be positive".into()));
        }
        tx.pull_into_custody(TransferKind::PoolFunding, from, amount)
    }

    /// Withdraw custody funds that back neither stake nor pending entitlements
    pub fn withdraw_excess(
        &self,
        tx: &mut Transaction<'_>,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("withdrawal amount must be positive".into()));
        }
        let globals = tx.globals()?;
        let available = self.spendable_rewards(tx, &globals);
        if amount > available {
            return Err(LedgerError::InsufficientRewardPool {
                available,
                requested: amount,
            });
        }
        tx.pay_from_custody(TransferKind::ExcessWithdrawal, to, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::{migrate, MemoryBackend};
    use crate::uptime::tests::node_at;
    use relaynet_core::{AssetError, InMemoryAssetLedger, ONE_TOKEN};

    struct Fixture {
        kv: MemoryBackend,
        assets: InMemoryAssetLedger,
        config: LedgerConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let config = LedgerConfig::default();
            let mut kv = MemoryBackend::new();
            migrate(&mut kv, &config).unwrap();
            Self {
                kv,
                assets: InMemoryAssetLedger::new(),
                config,
            }
        }

        fn tx(&self) -> Transaction<'_> {
            Transaction::new(&self.kv, &self.assets, self.config.token.clone(), self.config.custody)
        }
    }

    #[test]
    fn test_deposit_requires_allowance() {
        let mut fx = Fixture::new();
        let owner = AccountId::from_label("owner");
        fx.assets.mint(&fx.config.token, &owner, 500 * ONE_TOKEN);

        let stake = StakeLedger::new(10);
        let mut tx = fx.tx();
        assert!(matches!(
            stake.deposit_stake(&mut tx, &owner, 100 * ONE_TOKEN),
            Err(LedgerError::TransferFailed(AssetError::InsufficientAllowance { .. }))
        ));
        drop(tx);

        fx.assets
            .approve(&fx.config.token, &owner, &fx.config.custody, 100 * ONE_TOKEN);
        let mut tx = fx.tx();
        stake.deposit_stake(&mut tx, &owner, 100 * ONE_TOKEN).unwrap();
        assert_eq!(tx.globals().unwrap().total_staked, 100 * ONE_TOKEN);
        assert_eq!(tx.custody_balance(), 100 * ONE_TOKEN);
    }

    #[test]
    fn test_return_without_custody_funds_is_fatal() {
        let fx = Fixture::new();
        let owner = AccountId::from_label("owner");
        let stake = StakeLedger::new(10);
        let mut tx = fx.tx();

        let err = stake.return_stake(&mut tx, &owner, ONE_TOKEN).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_slash_routes_to_fee_pool() {
        let fx = Fixture::new();
        let stake = StakeLedger::new(10);
        let mut tx = fx.tx();
        let mut globals = tx.globals().unwrap();
        globals.total_staked = 100 * ONE_TOKEN;
        tx.put_globals(&globals).unwrap();

        let mut node = node_at(0, 50);
        node.staked_amount = 100 * ONE_TOKEN;

        let slashed = stake.slash(&mut tx, &mut node).unwrap();
        assert_eq!(slashed, 10 * ONE_TOKEN);
        assert_eq!(node.staked_amount, 90 * ONE_TOKEN);

        let forfeited = stake.forfeit(&mut tx, &mut node).unwrap();
        assert_eq!(forfeited, 90 * ONE_TOKEN);

        let globals = tx.globals().unwrap();
        assert_eq!(globals.total_staked, 0);
        assert_eq!(globals.fee_pool_total, 100 * ONE_TOKEN);
    }

    #[test]
    fn test_withdraw_excess_respects_reservations() {
        let mut fx = Fixture::new();
        let custody = fx.config.custody;
        fx.assets.mint(&fx.config.token, &custody, 50 * ONE_TOKEN);

        let stake = StakeLedger::new(10);
        let mut tx = fx.tx();
        let mut globals = tx.globals().unwrap();
        globals.total_staked = 30 * ONE_TOKEN;
        globals.pending_fee_total = 5 * ONE_TOKEN;
        tx.put_globals(&globals).unwrap();

        let treasury = AccountId::from_label("treasury");
        assert!(matches!(
            stake.withdraw_excess(&mut tx, &treasury, 16 * ONE_TOKEN),
            Err(LedgerError::InsufficientRewardPool { .. })
        ));
        stake.withdraw_excess(&mut tx, &treasury, 15 * ONE_TOKEN).unwrap();
        assert_eq!(tx.balance_of(&treasury), 15 * ONE_TOKEN);
    }
}
