//! DDL for the partitioned block store.
//!
//! The bootstrap script is a single `DO $$ … $$` block: every table and its
//! initial partitions are created only when the parent table is missing, and
//! the EVM extension columns are added with `ADD COLUMN IF NOT EXISTS` so that
//! a table created by an older binary picks them up. Running it twice is a
//! no-op.

use std::fmt::Write;

use blockindex_core::PartitionPlan;

/// Declared windows for the logs table at bootstrap.
pub const LOG_INITIAL_WINDOWS: u64 = 1;

/// `(column, type)` pairs of the EVM extension, in insert order.
pub const EVM_EXTENSION_COLUMNS: [(&str, &str); 16] = [
    ("gas_used", "BIGINT"),
    ("gas_limit", "BIGINT"),
    ("miner", "TEXT"),
    ("nonce", "TEXT"),
    ("difficulty", "TEXT"),
    ("extra_data", "TEXT"),
    ("logs_bloom", "TEXT"),
    ("mix_hash", "TEXT"),
    ("receipts_root", "TEXT"),
    ("sha3_uncles", "TEXT"),
    ("size_bytes", "BIGINT"),
    ("state_root", "TEXT"),
    ("tx_root", "TEXT"),
    ("tx_count", "BIGINT DEFAULT 0"),
    ("uncles", "TEXT[] DEFAULT '{}'::text[]"),
    ("tx_hashes", "TEXT[] DEFAULT '{}'::text[]"),
];

/// `CREATE TABLE` for one window of `table`.
pub fn partition_ddl(plan: &PartitionPlan, table: &str, index: u64, if_not_exists: bool) -> String {
    let range = plan.range(index);
    format!(
        "CREATE TABLE {guard}{name} PARTITION OF {table} FOR VALUES FROM ({start}) TO ({end})",
        guard = if if_not_exists { "IF NOT EXISTS " } else { "" },
        name = PartitionPlan::partition_name(table, index),
        start = range.start,
        end = range.end,
    )
}

fn missing(table: &str) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relname = '{table}' AND n.nspname = current_schema())"
    )
}

fn partitions(out: &mut String, plan: &PartitionPlan, table: &str, windows: u64) {
    for i in 0..windows {
        let _ = writeln!(out, "        {};", partition_ddl(plan, table, i, false));
    }
}

/// Full bootstrap script for `plan`.
pub fn bootstrap_sql(plan: &PartitionPlan) -> String {
    let mut sql = String::from("DO $$\nBEGIN\n");
    let evm_cols: String = EVM_EXTENSION_COLUMNS
        .iter()
        .map(|(name, ty)| format!("            {name} {ty},\n"))
        .collect();

    // blocks
    let _ = write!(
        sql,
        "    IF {} THEN
        CREATE TABLE blocks (
            number BIGINT NOT NULL,
            hash TEXT NOT NULL,
            parent_hash TEXT NOT NULL,
            timestamp TIMESTAMP WITHOUT TIME ZONE NOT NULL,
{evm_cols}            CONSTRAINT blocks_number_positive CHECK (number >= 0),
            CONSTRAINT pk_blocks PRIMARY KEY (number, hash)
        ) PARTITION BY RANGE (number);
",
        missing("blocks")
    );
    partitions(&mut sql, plan, "blocks", plan.initial_windows);
    sql.push_str(
        "        CREATE INDEX idx_blocks_number ON blocks USING btree (number);
        CREATE INDEX idx_blocks_hash ON blocks USING btree (hash);
    END IF;

",
    );

    let adds: Vec<String> = EVM_EXTENSION_COLUMNS
        .iter()
        .map(|(name, ty)| format!("        ADD COLUMN IF NOT EXISTS {name} {ty}"))
        .collect();
    let _ = write!(sql, "    ALTER TABLE blocks\n{};\n\n", adds.join(",\n"));

    // dag_blocks
    let _ = write!(
        sql,
        "    IF {} THEN
        CREATE TABLE dag_blocks (
            number BIGINT NOT NULL,
            hash TEXT NOT NULL,
            parent_hash TEXT,
            timestamp TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            CONSTRAINT dag_blocks_number_positive CHECK (number >= 0),
            CONSTRAINT pk_dag_blocks PRIMARY KEY (number, hash)
        ) PARTITION BY RANGE (number);
",
        missing("dag_blocks")
    );
    partitions(&mut sql, plan, "dag_blocks", plan.initial_windows);
    sql.push_str(
        "        CREATE INDEX idx_dag_blocks_number ON dag_blocks USING btree (number);
        CREATE INDEX idx_dag_blocks_hash ON dag_blocks USING btree (hash);
    END IF;

",
    );

    // transactions
    let _ = write!(
        sql,
        "    IF {} THEN
        CREATE TABLE transactions (
            hash TEXT NOT NULL,
            block_number BIGINT NOT NULL,
            \"from\" TEXT NOT NULL,
            \"to\" TEXT,
            value NUMERIC(78,0),
            status TEXT,
            created_at TIMESTAMP WITHOUT TIME ZONE DEFAULT now(),
            CONSTRAINT pk_transactions PRIMARY KEY (block_number, hash)
        ) PARTITION BY RANGE (block_number);
",
        missing("transactions")
    );
    partitions(&mut sql, plan, "transactions", plan.initial_windows);
    sql.push_str(
        "        CREATE INDEX idx_txs_block_number ON transactions USING btree (block_number);
        CREATE INDEX idx_txs_from ON transactions USING btree (\"from\");
        CREATE INDEX idx_txs_to ON transactions USING btree (\"to\");
        CREATE INDEX idx_txs_hash ON transactions USING btree (hash);
    END IF;

",
    );

    // logs
    let _ = write!(
        sql,
        "    IF {} THEN
        CREATE TABLE logs (
            tx_hash TEXT NOT NULL,
            block_number BIGINT NOT NULL,
            address TEXT NOT NULL,
            topic0 TEXT,
            topic1 TEXT,
            topic2 TEXT,
            topic3 TEXT,
            data BYTEA,
            log_index INT NOT NULL,
            created_at TIMESTAMP WITHOUT TIME ZONE DEFAULT now(),
            CONSTRAINT pk_logs PRIMARY KEY (block_number, tx_hash, log_index)
        ) PARTITION BY RANGE (block_number);
",
        missing("logs")
    );
    partitions(&mut sql, plan, "logs", LOG_INITIAL_WINDOWS);
    sql.push_str(
        "        CREATE INDEX idx_logs_tx_hash ON logs(tx_hash);
        CREATE INDEX idx_logs_address ON logs(address);
        CREATE INDEX idx_logs_topic0 ON logs(topic0);
    END IF;

",
    );

    // addresses
    let _ = write!(
        sql,
        "    IF {} THEN
        CREATE TABLE addresses (
            address TEXT PRIMARY KEY,
            first_seen_block BIGINT,
            last_seen_block BIGINT,
            tx_count BIGINT DEFAULT 0
        );
    END IF;
    ALTER TABLE addresses ADD COLUMN IF NOT EXISTS balance NUMERIC(78,0) DEFAULT 0;
",
        missing("addresses")
    );

    sql.push_str("END $$;");
    sql
}
