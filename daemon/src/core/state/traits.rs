use primitive_types::U256;

use nhb_common::{
    account::{Account, AccountMeta},
    crypto::{Address, Hash},
    escrow::{Escrow, Realm, Token, Trade},
    events::Emitter,
};

use crate::core::error::ChainError;

/// Block-scoped environment visible to transaction handlers
pub trait BlockEnv {
    fn height(&self) -> u64;
    /// Block timestamp in unix seconds
    fn now(&self) -> i64;
}

/// Fused account access: the canonical state record plus the out-of-band
/// metadata record. The default balance helpers route native amounts to
/// the account and secondary amounts to the metadata.
pub trait AccountState {
    fn get_account(&mut self, address: &Address) -> Result<Account, ChainError>;
    fn set_account(&mut self, address: &Address, account: &Account) -> Result<(), ChainError>;
    fn get_meta(&mut self, address: &Address) -> Result<AccountMeta, ChainError>;
    fn set_meta(&mut self, address: &Address, meta: &AccountMeta) -> Result<(), ChainError>;

    fn balance(&mut self, address: &Address, token: Token) -> Result<U256, ChainError> {
        match token {
            Token::Nhb => Ok(self.get_account(address)?.balance_native),
            Token::Znhb => Ok(self.get_meta(address)?.balance_secondary),
        }
    }

    fn credit(&mut self, address: &Address, token: Token, amount: U256) -> Result<(), ChainError> {
        match token {
            Token::Nhb => {
                let mut account = self.get_account(address)?;
                account.balance_native = account
                    .balance_native
                    .checked_add(amount)
                    .ok_or(ChainError::BalanceOverflow)?;
                self.set_account(address, &account)
            }
            Token::Znhb => {
                let mut meta = self.get_meta(address)?;
                meta.balance_secondary = meta
                    .balance_secondary
                    .checked_add(amount)
                    .ok_or(ChainError::BalanceOverflow)?;
                self.set_meta(address, &meta)
            }
        }
    }

    fn debit(&mut self, address: &Address, token: Token, amount: U256) -> Result<(), ChainError> {
        let available = self.balance(address, token)?;
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                needed: amount.to_string(),
                available: available.to_string(),
            });
        }
        match token {
            Token::Nhb => {
                let mut account = self.get_account(address)?;
                account.balance_native -= amount;
                self.set_account(address, &account)
            }
            Token::Znhb => {
                let mut meta = self.get_meta(address)?;
                meta.balance_secondary -= amount;
                self.set_meta(address, &meta)
            }
        }
    }
}

pub trait EscrowProvider {
    fn get_escrow(&mut self, id: &Hash) -> Result<Option<Escrow>, ChainError>;
    fn set_escrow(&mut self, escrow: &Escrow) -> Result<(), ChainError>;
}

pub trait RealmProvider {
    fn get_realm(&mut self, id: &str) -> Result<Option<Realm>, ChainError>;
    fn set_realm(&mut self, realm: &Realm) -> Result<(), ChainError>;
}

pub trait TradeProvider {
    fn get_trade(&mut self, id: &Hash) -> Result<Option<Trade>, ChainError>;
    fn set_trade(&mut self, trade: &Trade) -> Result<(), ChainError>;
    /// Reverse index from an escrow leg to its owning trade
    fn trade_for_escrow(&mut self, escrow_id: &Hash) -> Result<Option<Hash>, ChainError>;
    fn link_escrow(&mut self, escrow_id: &Hash, trade_id: &Hash) -> Result<(), ChainError>;
}

/// Everything the escrow engine needs from its host
pub trait EscrowState:
    AccountState + EscrowProvider + RealmProvider + BlockEnv + Emitter
{
}

impl<T: AccountState + EscrowProvider + RealmProvider + BlockEnv + Emitter> EscrowState for T {}

/// Everything the trade engine needs from its host
pub trait TradeState: EscrowState + TradeProvider {}

impl<T: EscrowState + TradeProvider> TradeState for T {}
