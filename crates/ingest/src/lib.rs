//! Historical Ethereum transaction rows.
//!
//! The ingestion collaborator replays a CSV export of mainnet
//! transactions into the shard processes. This crate owns the row model
//! and, crucially, [`TxRow::proposer_fee`]: the single place where
//! proposer revenue is computed. Everything downstream (fee windows,
//! subsidies, utilities) inherits its exactness from this function.
//!
//! Expected column order:
//!
//! ```text
//! blockNumber, timestamp, txHash, from, to, toCreate, value, gasLimit,
//! gasPrice, gasUsed, eip2718Type, baseFeePerGas, maxFeePerGas,
//! maxPriorityFeePerGas, isError, blobHashes, blobBaseFeePerGas,
//! blobGasUsed
//! ```
//!
//! Empty fields and the literal `None` mean "absent", matching common
//! dataset exports.

use fairshard_types::{Address, Transaction};
use num_bigint::BigUint;
use num_traits::Zero;

/// Number of columns in a well-formed row.
pub const ROW_FIELDS: usize = 18;

/// One transaction row from the historical dataset.
///
/// Optional money fields are `None` when the export had no value for the
/// transaction type (a legacy row has no base fee, a pre-4844 row has no
/// blob fields).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxRow {
    pub block_number: u64,
    pub timestamp: u64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    /// Created-contract address when `to` is empty.
    pub to_create: String,
    pub value: BigUint,
    pub gas_limit: u64,
    /// Gas price of legacy and EIP-2930 transactions.
    pub gas_price: Option<BigUint>,
    pub gas_used: u64,
    /// EIP-2718 envelope type: 0 legacy, 1 access-list, 2 EIP-1559,
    /// 3 blob.
    pub eip2718_type: u8,
    pub base_fee_per_gas: Option<BigUint>,
    pub max_fee_per_gas: Option<BigUint>,
    pub max_priority_fee_per_gas: Option<BigUint>,
    pub is_error: bool,
    pub blob_hashes: Vec<String>,
    pub blob_base_fee_per_gas: Option<BigUint>,
    pub blob_gas_used: u64,
}

/// Row parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("field {field} is not a valid unsigned integer: {value:?}")]
    InvalidUint { field: &'static str, value: String },

    #[error("field {field} is not a valid amount: {value:?}")]
    InvalidAmount { field: &'static str, value: String },
}

fn is_absent(raw: &str) -> bool {
    raw.is_empty() || raw == "None"
}

fn parse_u64(field: &'static str, raw: &str) -> Result<u64, RowError> {
    if is_absent(raw) {
        return Ok(0);
    }
    raw.trim().parse().map_err(|_| RowError::InvalidUint {
        field,
        value: raw.to_owned(),
    })
}

fn parse_u8(field: &'static str, raw: &str) -> Result<u8, RowError> {
    if is_absent(raw) {
        return Ok(0);
    }
    raw.trim().parse().map_err(|_| RowError::InvalidUint {
        field,
        value: raw.to_owned(),
    })
}

fn parse_amount(field: &'static str, raw: &str) -> Result<Option<BigUint>, RowError> {
    if is_absent(raw) {
        return Ok(None);
    }
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| RowError::InvalidAmount {
            field,
            value: raw.to_owned(),
        })
}

impl TxRow {
    /// Parse one CSV record, already split into fields.
    pub fn parse(fields: &[&str]) -> Result<Self, RowError> {
        if fields.len() != ROW_FIELDS {
            return Err(RowError::FieldCount {
                expected: ROW_FIELDS,
                actual: fields.len(),
            });
        }

        Ok(Self {
            block_number: parse_u64("blockNumber", fields[0])?,
            timestamp: parse_u64("timestamp", fields[1])?,
            tx_hash: fields[2].to_owned(),
            from: fields[3].to_owned(),
            to: fields[4].to_owned(),
            to_create: fields[5].to_owned(),
            value: parse_amount("value", fields[6])?.unwrap_or_else(BigUint::zero),
            gas_limit: parse_u64("gasLimit", fields[7])?,
            gas_price: parse_amount("gasPrice", fields[8])?,
            gas_used: parse_u64("gasUsed", fields[9])?,
            eip2718_type: parse_u8("eip2718Type", fields[10])?,
            base_fee_per_gas: parse_amount("baseFeePerGas", fields[11])?,
            max_fee_per_gas: parse_amount("maxFeePerGas", fields[12])?,
            max_priority_fee_per_gas: parse_amount("maxPriorityFeePerGas", fields[13])?,
            is_error: fields[14] == "1" || fields[14].eq_ignore_ascii_case("true"),
            blob_hashes: if is_absent(fields[15]) {
                Vec::new()
            } else {
                fields[15].split(';').map(str::to_owned).collect()
            },
            blob_base_fee_per_gas: parse_amount("blobBaseFeePerGas", fields[16])?,
            blob_gas_used: parse_u64("blobGasUsed", fields[17])?,
        })
    }

    /// Proposer (block builder) revenue in wei.
    ///
    /// - Types 0 and 1: `gasUsed * gasPrice`.
    /// - Types 2 and 3: only the tip,
    ///   `gasUsed * max(min(maxFee, baseFee + maxPriority) - baseFee, 0)`.
    ///   The burned base fee and all blob-gas fees are never proposer
    ///   revenue.
    /// - Unknown future types: 0.
    ///
    /// Failed transactions still pay; `is_error` does not enter the
    /// formula.
    pub fn proposer_fee(&self) -> BigUint {
        if self.gas_used == 0 {
            return BigUint::zero();
        }
        let gas_used = BigUint::from(self.gas_used);

        match self.eip2718_type {
            0 | 1 => match &self.gas_price {
                Some(gas_price) => gas_used * gas_price,
                None => BigUint::zero(),
            },
            2 | 3 => {
                let (Some(base), Some(max_fee), Some(max_priority)) = (
                    &self.base_fee_per_gas,
                    &self.max_fee_per_gas,
                    &self.max_priority_fee_per_gas,
                ) else {
                    return BigUint::zero();
                };

                let effective = (base + max_priority).min(max_fee.clone());
                if &effective <= base {
                    return BigUint::zero();
                }
                let tip = effective - base;
                gas_used * tip
            }
            _ => BigUint::zero(),
        }
    }

    /// Destination address: the recipient, or the created contract for a
    /// contract creation.
    pub fn to_address(&self) -> &str {
        if !self.to.is_empty() {
            &self.to
        } else {
            &self.to_create
        }
    }

    /// Build a routed transaction from this row.
    ///
    /// The proposer fee is computed here, once, and travels with the
    /// transaction from then on.
    pub fn into_transaction(self, num_shards: u64, nonce: u64) -> Transaction {
        let sender = Address::new(self.from.clone());
        let recipient = Address::new(self.to_address().to_owned());
        let fee = self.proposer_fee();

        let mut tx = Transaction::new(
            sender,
            recipient,
            self.value,
            nonce,
            num_shards,
            self.timestamp.saturating_mul(1000),
        );
        tx.fee_to_proposer = fee;
        tx
    }
}
