//! Seeds rights balances for local development and testing.
//!
//! Goes through the ledger service, so every seeded balance has a matching
//! fund and ledger entry. Deposits carry idempotency keys and re-running the
//! seeder changes nothing.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use rights_core::fund::{
    DepositRequest, FundLedgerService, NoopNotificationSink, TenantContext, TracingAuditSink,
    event_channel, spawn_event_worker,
};
use rights_db::FundRepository;
use rights_db::migration::{Migrator, MigratorTrait};
use rights_shared::AppConfig;
use rights_shared::types::{MerchantId, OperatorId, TenantId};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Development tenant.
const TENANT: TenantId = TenantId::new(1);
/// Operator recorded on seeded funds.
const SEED_OPERATOR: OperatorId = OperatorId::new(1);
/// Merchants and their opening deposits.
const MERCHANTS: [(MerchantId, i64); 2] = [(MerchantId::new(7), 1000), (MerchantId::new(8), 250)];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rights=debug,seeder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = rights_db::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    Migrator::up(&db, None).await.context("failed to run migrations")?;

    let (publisher, rx) = event_channel(config.events.channel_capacity);
    let worker = spawn_event_worker(rx, Arc::new(TracingAuditSink), Arc::new(NoopNotificationSink));
    let service = FundLedgerService::new(FundRepository::new(db), publisher, config.ledger.clone());
    let ctx = TenantContext::new(TENANT, SEED_OPERATOR)?;

    for (merchant_id, amount) in MERCHANTS {
        let fund = service
            .deposit(
                &ctx,
                DepositRequest {
                    merchant_id,
                    amount: Decimal::from(amount),
                    currency: config.ledger.base_currency,
                    description: "Opening balance".to_string(),
                    idempotency_key: Some(format!("seed-{merchant_id}")),
                },
            )
            .await
            .with_context(|| format!("failed to seed merchant {merchant_id}"))?;
        let balance = service.get_balance(&ctx, merchant_id).await?;
        info!(
            %merchant_id,
            fund_id = %fund.id,
            available = %balance.available_balance(),
            "Merchant seeded"
        );
    }

    // Dropping the service closes the channel so the worker drains and exits.
    drop(service);
    worker.await.context("event worker panicked")?;

    info!("Seeding complete");
    Ok(())
}
