use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use marche_catalog::shipping::validate_default_uniqueness;
use marche_order::requests::{CharacterEncoding, ExportRequest};
use marche_order::{export_orders, OrderFilter, OrderRepository, OrderStatus, ShippingCarrier, ShippingRepository};
use marche_store::{BroadcastPublisher, Config, DbClient, PgOrderRepository, ShippingCache};

#[derive(Parser)]
#[command(name = "marche-admin")]
#[command(about = "Operator tasks for the order settlement engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Check a coordinator's shipping tables for gaps, overlaps and duplicate defaults
    ValidateShipping {
        #[arg(long)]
        coordinator: Uuid,
    },
    /// Drop the cached default shipping table of a coordinator
    EvictShippingCache {
        #[arg(long)]
        coordinator: Uuid,
    },
    /// Mark a delivered order as completed
    CompleteOrder {
        #[arg(long)]
        order: Uuid,
    },
    /// Cancel an order that has not started preparation
    CancelOrder {
        #[arg(long)]
        order: Uuid,
    },
    /// Write a carrier CSV of boxes waiting to ship
    ExportOrders {
        #[arg(long, value_enum)]
        carrier: Carrier,
        #[arg(long, value_enum, default_value_t = Encoding::Utf8)]
        encoding: Encoding,
        #[arg(long)]
        coordinator: Option<Uuid>,
        /// Defaults to stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Carrier {
    Yamato,
    Sagawa,
    JapanPost,
}

impl From<Carrier> for ShippingCarrier {
    fn from(carrier: Carrier) -> Self {
        match carrier {
            Carrier::Yamato => ShippingCarrier::Yamato,
            Carrier::Sagawa => ShippingCarrier::Sagawa,
            Carrier::JapanPost => ShippingCarrier::JapanPost,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    Utf8,
    Utf8Bom,
}

impl From<Encoding> for CharacterEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Utf8 => CharacterEncoding::Utf8,
            Encoding::Utf8Bom => CharacterEncoding::Utf8Bom,
        }
    }
}

async fn validate_shipping(shippings: &ShippingCache, coordinator_id: Uuid) -> anyhow::Result<()> {
    let records = shippings.list(coordinator_id).await?;
    if records.is_empty() {
        bail!("Coordinator {} has no shipping tables", coordinator_id);
    }

    let mut problems = 0;
    for shipping in &records {
        match shipping.validate() {
            Ok(()) => tracing::info!("Shipping {} ({}) is valid", shipping.id, shipping.name),
            Err(errors) => {
                for error in errors {
                    tracing::error!("Shipping {} ({}): {}", shipping.id, shipping.name, error);
                    problems += 1;
                }
            }
        }
    }
    if let Err(e) = validate_default_uniqueness(&records) {
        tracing::error!("{}", e);
        problems += 1;
    }

    match shippings.get_default(coordinator_id).await? {
        Some(default) => tracing::info!("Default shipping in effect: {} ({})", default.id, default.name),
        None => {
            tracing::error!("Coordinator {} has no default shipping table", coordinator_id);
            problems += 1;
        }
    }

    if problems > 0 {
        bail!("{} shipping configuration problem(s) found", problems);
    }
    Ok(())
}

async fn export(
    orders: &PgOrderRepository,
    request: ExportRequest,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let filter = OrderFilter {
        coordinator_id: request.coordinator_id,
        statuses: vec![OrderStatus::Preparing],
    };
    let preparing = orders.list(&filter).await?;

    let out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let rows = export_orders(&preparing, &request, out)?;
    tracing::info!(
        "Exported {} box(es) from {} order(s) for {}",
        rows,
        preparing.len(),
        request.shipping_carrier
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marche_admin=debug,marche_order=info,marche_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load config")?;
    let db = DbClient::new(&config.database).await.context("Failed to connect to Postgres")?;

    match cli.command {
        Commands::Migrate => db.migrate().await?,
        Commands::ValidateShipping { coordinator } => {
            validate_shipping(&marche_store::shipping_cache(&config, &db)?, coordinator).await?
        }
        Commands::EvictShippingCache { coordinator } => {
            marche_store::shipping_cache(&config, &db)?.invalidate(coordinator).await
        }
        Commands::CompleteOrder { order } => {
            let manager = marche_store::order_manager(&config, &db, Arc::new(BroadcastPublisher::new(16)))?;
            let order = manager.complete_order(order).await?;
            tracing::info!("Order {} is now {}", order.id, order.status);
        }
        Commands::CancelOrder { order } => {
            let manager = marche_store::order_manager(&config, &db, Arc::new(BroadcastPublisher::new(16)))?;
            let order = manager.cancel_order(order).await?;
            tracing::info!("Order {} is now {}", order.id, order.status);
        }
        Commands::ExportOrders { carrier, encoding, coordinator, output } => {
            let request = ExportRequest {
                shipping_carrier: carrier.into(),
                encoding: encoding.into(),
                coordinator_id: coordinator,
            };
            export(&PgOrderRepository::new(db.pool.clone()), request, output).await?
        }
    }

    Ok(())
}
