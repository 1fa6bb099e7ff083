//! Fund ledger schema.
//!
//! Creates the fund, fund transaction and merchant rights balance tables,
//! their enums, the append-only trigger on fund transactions and the tenant
//! isolation policies.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: BALANCES
        // ============================================================
        db.execute_unprepared(MERCHANT_RIGHTS_BALANCES_SQL).await?;

        // ============================================================
        // PART 3: FUNDS & LEDGER ENTRIES
        // ============================================================
        db.execute_unprepared(FUNDS_SQL).await?;
        db.execute_unprepared(FUND_TRANSACTIONS_SQL).await?;

        // ============================================================
        // PART 4: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        // ============================================================
        // PART 5: ROW LEVEL SECURITY
        // ============================================================
        db.execute_unprepared(RLS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE fund_type AS ENUM ('deposit', 'allocation');
CREATE TYPE fund_status AS ENUM ('pending', 'confirmed', 'failed');
CREATE TYPE fund_transaction_type AS ENUM ('credit', 'debit');
CREATE TYPE fund_transaction_kind AS ENUM ('deposit', 'allocation', 'freeze', 'unfreeze', 'consume');
";

const MERCHANT_RIGHTS_BALANCES_SQL: &str = r"
CREATE TABLE merchant_rights_balances (
    tenant_id       BIGINT NOT NULL,
    merchant_id     BIGINT NOT NULL,
    total_balance   NUMERIC(19, 4) NOT NULL DEFAULT 0,
    used_balance    NUMERIC(19, 4) NOT NULL DEFAULT 0,
    frozen_balance  NUMERIC(19, 4) NOT NULL DEFAULT 0,
    version         BIGINT NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    PRIMARY KEY (tenant_id, merchant_id),
    CONSTRAINT chk_balance_non_negative CHECK (
        total_balance >= 0 AND used_balance >= 0 AND frozen_balance >= 0
    ),
    CONSTRAINT chk_frozen_within_unused CHECK (frozen_balance <= total_balance - used_balance)
);
";

const FUNDS_SQL: &str = r"
CREATE TABLE funds (
    id              UUID PRIMARY KEY,
    tenant_id       BIGINT NOT NULL,
    merchant_id     BIGINT NOT NULL,
    fund_type       fund_type NOT NULL,
    amount          NUMERIC(19, 4) NOT NULL,
    currency        CHAR(3) NOT NULL,
    status          fund_status NOT NULL DEFAULT 'pending',
    description     VARCHAR(255) NOT NULL DEFAULT '',
    operator_id     BIGINT NOT NULL,
    idempotency_key VARCHAR(64),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_fund_amount_positive CHECK (amount > 0),
    CONSTRAINT uq_funds_tenant_id UNIQUE (tenant_id, id),
    CONSTRAINT uq_funds_idempotency_key UNIQUE (tenant_id, idempotency_key),
    CONSTRAINT fk_funds_balance FOREIGN KEY (tenant_id, merchant_id)
        REFERENCES merchant_rights_balances(tenant_id, merchant_id)
);

CREATE INDEX idx_funds_tenant_merchant ON funds(tenant_id, merchant_id, created_at DESC);
CREATE INDEX idx_funds_tenant_created ON funds(tenant_id, created_at DESC);
CREATE INDEX idx_funds_tenant_status ON funds(tenant_id, status);
";

const FUND_TRANSACTIONS_SQL: &str = r"
CREATE TABLE fund_transactions (
    id               UUID PRIMARY KEY,
    tenant_id        BIGINT NOT NULL,
    merchant_id      BIGINT NOT NULL,
    fund_id          UUID,
    transaction_type fund_transaction_type NOT NULL,
    kind             fund_transaction_kind NOT NULL,
    amount           NUMERIC(19, 4) NOT NULL,
    balance_before   NUMERIC(19, 4) NOT NULL,
    balance_after    NUMERIC(19, 4) NOT NULL,
    operator_id      BIGINT NOT NULL,
    description      VARCHAR(255) NOT NULL DEFAULT '',
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_fund_tx_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_fund_tx_direction CHECK (
        (kind IN ('deposit', 'allocation', 'unfreeze')) = (transaction_type = 'credit')
    ),
    CONSTRAINT chk_fund_tx_delta CHECK (
        balance_after - balance_before =
            CASE WHEN transaction_type = 'credit' THEN amount ELSE -amount END
    ),
    CONSTRAINT fk_fund_tx_fund FOREIGN KEY (tenant_id, fund_id)
        REFERENCES funds(tenant_id, id),
    CONSTRAINT fk_fund_tx_balance FOREIGN KEY (tenant_id, merchant_id)
        REFERENCES merchant_rights_balances(tenant_id, merchant_id)
);

CREATE INDEX idx_fund_tx_tenant_merchant ON fund_transactions(tenant_id, merchant_id, created_at DESC);
CREATE INDEX idx_fund_tx_tenant_created ON fund_transactions(tenant_id, created_at DESC);
CREATE INDEX idx_fund_tx_fund ON fund_transactions(fund_id) WHERE fund_id IS NOT NULL;
";

const TRIGGERS_SQL: &str = r"
-- Ledger entries are append-only
CREATE OR REPLACE FUNCTION prevent_fund_transaction_modification()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'fund_transactions is append-only: % not allowed', TG_OP;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_fund_transactions_immutable
    BEFORE UPDATE OR DELETE ON fund_transactions
    FOR EACH ROW EXECUTE FUNCTION prevent_fund_transaction_modification();

-- Confirmed and failed funds are terminal
CREATE OR REPLACE FUNCTION prevent_terminal_fund_change()
RETURNS TRIGGER AS $$
BEGIN
    IF OLD.status <> 'pending' AND NEW.status IS DISTINCT FROM OLD.status THEN
        RAISE EXCEPTION 'fund % is %, status cannot change', OLD.id, OLD.status;
    END IF;
    NEW.updated_at := NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_funds_terminal_status
    BEFORE UPDATE ON funds
    FOR EACH ROW EXECUTE FUNCTION prevent_terminal_fund_change();
";

const RLS_SQL: &str = r"
ALTER TABLE merchant_rights_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE funds ENABLE ROW LEVEL SECURITY;
ALTER TABLE fund_transactions ENABLE ROW LEVEL SECURITY;

CREATE POLICY tenant_isolation ON merchant_rights_balances
    USING (tenant_id = NULLIF(current_setting('app.current_tenant_id', true), '')::BIGINT);

CREATE POLICY tenant_isolation ON funds
    USING (tenant_id = NULLIF(current_setting('app.current_tenant_id', true), '')::BIGINT);

CREATE POLICY tenant_isolation ON fund_transactions
    USING (tenant_id = NULLIF(current_setting('app.current_tenant_id', true), '')::BIGINT);
";

const DROP_ALL_SQL: &str = r"
-- Drop policies
DROP POLICY IF EXISTS tenant_isolation ON fund_transactions;
DROP POLICY IF EXISTS tenant_isolation ON funds;
DROP POLICY IF EXISTS tenant_isolation ON merchant_rights_balances;

-- Drop triggers
DROP TRIGGER IF EXISTS trg_funds_terminal_status ON funds;
DROP TRIGGER IF EXISTS trg_fund_transactions_immutable ON fund_transactions;

-- Drop functions
DROP FUNCTION IF EXISTS prevent_terminal_fund_change();
DROP FUNCTION IF EXISTS prevent_fund_transaction_modification();

-- Drop tables (reverse order of creation)
DROP TABLE IF EXISTS fund_transactions CASCADE;
DROP TABLE IF EXISTS funds CASCADE;
DROP TABLE IF EXISTS merchant_rights_balances CASCADE;

-- Drop enums
DROP TYPE IF EXISTS fund_transaction_kind CASCADE;
DROP TYPE IF EXISTS fund_transaction_type CASCADE;
DROP TYPE IF EXISTS fund_status CASCADE;
DROP TYPE IF EXISTS fund_type CASCADE;
";
