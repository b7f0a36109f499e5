//! Shared types for the ingestion pipeline and the read path.

use serde::{Deserialize, Serialize};

// ─── Source ───────────────────────────────────────────────────────────────────

/// One of the two upstream chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// EVM-style chain, blocks addressed by number.
    Evm,
    /// DAG-ordered chain, blocks addressed by order index.
    Dag,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Evm, Source::Dag];

    /// Backing table for this source's blocks.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Evm => "blocks",
            Self::Dag => "dag_blocks",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Dag => "dag",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── BlockRecord ──────────────────────────────────────────────────────────────

/// Canonical normalized block, shared by both sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block number (EVM) or order index (DAG); monotonic per source.
    pub number: u64,
    /// Block hash in the source's own encoding.
    pub hash: String,
    /// Parent hash; empty when the source does not report one.
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// Extended attributes, only populated by the EVM source.
    #[serde(flatten)]
    pub evm: Option<EvmExtension>,
}

impl BlockRecord {
    /// A record carrying only the four base fields.
    pub fn base(
        number: u64,
        hash: impl Into<String>,
        parent_hash: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            number,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
            timestamp,
            evm: None,
        }
    }

    pub fn with_evm(mut self, ext: EvmExtension) -> Self {
        self.evm = Some(ext);
        self
    }

    /// Number of transactions, 0 when the extension is absent.
    pub fn tx_count(&self) -> u32 {
        self.evm.as_ref().map(|e| e.tx_count).unwrap_or(0)
    }
}

/// EVM-only block attributes, copied from the RPC response without decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmExtension {
    pub gas_used: u64,
    pub gas_limit: u64,
    pub miner: String,
    pub nonce: String,
    pub difficulty: String,
    pub extra_data: String,
    pub logs_bloom: String,
    pub mix_hash: String,
    pub receipts_root: String,
    pub sha3_uncles: String,
    pub size_bytes: u64,
    pub state_root: String,
    pub tx_root: String,
    pub tx_count: u32,
    pub uncles: Vec<String>,
    pub tx_hashes: Vec<String>,
}

// ─── Read-side summaries ──────────────────────────────────────────────────────

/// A transaction row as served by the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Decimal string; values exceed `u64`.
    pub value: String,
    pub block_number: u64,
    pub status: String,
}

/// Address activity summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSummary {
    pub address: String,
    pub balance: String,
    pub tx_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_block: Option<u64>,
}

impl AddressSummary {
    /// Summary for an address with no recorded activity.
    pub fn empty(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: "0".into(),
            tx_count: 0,
            first_seen_block: None,
            last_seen_block: None,
        }
    }
}

/// Raw row counts per block table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCounts {
    pub evm_blocks: u64,
    pub dag_blocks: u64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
