//! Keeps the relayer's delivery account funded.
use std::{fmt, str::FromStr, thread, time::Duration};

use ethers_core::{
    types::{
        BlockNumber, Bytes, TransactionRequest, U64, U256,
        transaction::eip2718::TypedTransaction,
    },
    utils::to_checksum,
};
use ethers_providers::{Http, Middleware, Provider};
use ethers_signers::{LocalWallet, Signer};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

pub use ethers_core::types::Address;

use crate::{
    constants::{FUNDING_CONFIRM_ATTEMPTS, FUNDING_CONFIRM_INTERVAL, TRANSFER_GAS_LIMIT},
    error::FundingError,
};

/// Balance reads and signed value transfers on an EVM chain.
pub trait ChainClient {
    /// Balance of `address` in the chain's smallest denomination.
    fn balance(&self, address: Address) -> Result<u128, FundingError>;

    /// Transfers `amount` to `recipient`, signed by `key`.
    fn transfer(
        &self,
        key: &FundingKey,
        recipient: Address,
        amount: u128,
    ) -> Result<(), FundingError>;
}

/// Private key of the account paying for top-ups.
#[derive(Clone)]
pub struct FundingKey {
    wallet: LocalWallet,
}

impl FundingKey {
    /// Parses a hex-encoded secp256k1 private key, with or without `0x`.
    pub fn from_hex(raw: &str) -> Result<Self, FundingError> {
        let raw = raw.trim();
        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        let wallet = LocalWallet::from_str(digits).map_err(FundingError::InvalidKey)?;
        Ok(Self { wallet })
    }

    /// Account controlled by this key.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs `tx` and returns its raw RLP encoding.
    pub fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, FundingError> {
        let signature = self
            .wallet
            .sign_transaction_sync(tx)
            .map_err(FundingError::Signer)?;
        Ok(tx.rlp_signed(&signature))
    }
}

// Never print the secret.
impl fmt::Debug for FundingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FundingKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Parses a `0x`-prefixed account address.
pub fn parse_address(raw: &str) -> Result<Address, FundingError> {
    Address::from_str(raw.trim()).map_err(|_| FundingError::InvalidAddress(raw.to_string()))
}

/// Checksummed rendering of `address`.
pub fn display_address(address: Address) -> String {
    to_checksum(&address, None)
}

/// Legacy EIP-155 transfer of `amount` from `from` to `to`.
pub fn transfer_request(
    from: Address,
    to: Address,
    amount: u128,
    nonce: U256,
    gas_price: U256,
    chain_id: u64,
) -> TypedTransaction {
    TransactionRequest::new()
        .from(from)
        .to(to)
        .value(U256::from(amount))
        .nonce(nonce)
        .gas(TRANSFER_GAS_LIMIT)
        .gas_price(gas_price)
        .chain_id(chain_id)
        .into()
}

/// What [`ensure_funded`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingOutcome {
    /// The balance already met the requirement.
    AlreadyFunded {
        /// Balance observed.
        balance: u128,
    },
    /// A transfer covered the shortfall.
    Funded {
        /// Amount transferred.
        amount: u128,
        /// Balance observed afterwards.
        balance: u128,
    },
}

/// Tops `relayer_address` up to `required` from the account behind `key`.
///
/// The post-transfer balance is re-read a few times to give the transfer time to land;
/// a balance still short of `required` is an error.
pub fn ensure_funded<C: ChainClient>(
    client: &C,
    key: &FundingKey,
    relayer_address: Address,
    required: u128,
) -> Result<FundingOutcome, FundingError> {
    ensure_funded_with(
        client,
        key,
        relayer_address,
        required,
        FUNDING_CONFIRM_ATTEMPTS,
        FUNDING_CONFIRM_INTERVAL,
    )
}

/// [`ensure_funded`] with explicit confirmation polling.
pub fn ensure_funded_with<C: ChainClient>(
    client: &C,
    key: &FundingKey,
    relayer_address: Address,
    required: u128,
    attempts: usize,
    interval: Duration,
) -> Result<FundingOutcome, FundingError> {
    let label = display_address(relayer_address);
    let balance = client.balance(relayer_address)?;
    if balance >= required {
        debug!("Relayer {label} balance {balance} meets requirement {required}");
        return Ok(FundingOutcome::AlreadyFunded { balance });
    }

    let amount = required - balance;
    info!(
        "Funding relayer {label} with {amount} from {}",
        display_address(key.address())
    );
    client.transfer(key, relayer_address, amount)?;

    let mut actual = balance;
    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            thread::sleep(interval);
        }
        actual = client.balance(relayer_address)?;
        if actual >= required {
            return Ok(FundingOutcome::Funded {
                amount,
                balance: actual,
            });
        }
    }

    Err(FundingError::InsufficientBalance {
        address: label,
        required,
        actual,
    })
}

fn to_u128(quantity: U256) -> Result<u128, FundingError> {
    if quantity > U256::from(u128::MAX) {
        return Err(FundingError::InvalidQuantity(quantity.to_string()));
    }
    Ok(quantity.as_u128())
}

/// [`ChainClient`] over an HTTP JSON-RPC endpoint.
///
/// Transfers are signed locally and submitted with `eth_sendRawTransaction`, so the
/// node never needs to hold the funding account.
#[derive(Debug)]
pub struct RpcChainClient {
    provider: Provider<Http>,
    runtime: Runtime,
}

impl RpcChainClient {
    /// Client for the RPC endpoint at `url`.
    pub fn new(url: &str) -> Result<Self, FundingError> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|err| FundingError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            })?
            .interval(FUNDING_CONFIRM_INTERVAL);
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FundingError::Runtime)?;
        Ok(Self { provider, runtime })
    }
}

impl ChainClient for RpcChainClient {
    fn balance(&self, address: Address) -> Result<u128, FundingError> {
        let balance = self
            .runtime
            .block_on(self.provider.get_balance(address, None))?;
        to_u128(balance)
    }

    fn transfer(
        &self,
        key: &FundingKey,
        recipient: Address,
        amount: u128,
    ) -> Result<(), FundingError> {
        self.runtime.block_on(async {
            let chain_id = self.provider.get_chainid().await?.as_u64();
            let nonce = self
                .provider
                .get_transaction_count(key.address(), Some(BlockNumber::Pending.into()))
                .await?;
            let gas_price = self.provider.get_gas_price().await?;

            let tx = transfer_request(key.address(), recipient, amount, nonce, gas_price, chain_id);
            let raw = key.sign(&tx)?;

            let pending = self.provider.send_raw_transaction(raw).await?;
            let tx_hash = format!("{:#x}", pending.tx_hash());
            debug!("Funding transaction submitted: {tx_hash}");

            match pending.confirmations(1).await? {
                None => Err(FundingError::TransferDropped { tx_hash }),
                Some(receipt) if receipt.status == Some(U64::zero()) => {
                    Err(FundingError::TransferReverted { tx_hash })
                }
                Some(_) => Ok(()),
            }
        })
    }
}
