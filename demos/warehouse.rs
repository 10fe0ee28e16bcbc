//! Walks one transfer through the workflow against a throwaway database.
//!
//! ```text
//! RUST_LOG=stockflow=debug cargo run --example warehouse [status]
//! ```
//!
//! `status` picks which requests are listed at the end (default `executed`).

use anyhow::Context;
use stockflow::audit::{LogFilter, Metadata};
use stockflow::item::NewItem;
use stockflow::location::{LocationType, NewLocation};
use stockflow::movement::{MovementStatus, ProposedMovement};
use stockflow::types::UserId;
use stockflow::{Quantity, StockService, StoreConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let wanted = std::env::args().nth(1).unwrap_or_else(|| "executed".into());
    let status = MovementStatus::parse(&wanted)
        .with_context(|| format!("unknown movement status {wanted:?}"))?;

    let config = StoreConfig::temporary();
    let service = StockService::with_config(config.open()?, &config);
    let catalog = service.catalog();

    let main = catalog.create_location(NewLocation {
        name: "Main warehouse".into(),
        kind: LocationType::Warehouse,
        ..Default::default()
    })?;
    let customer = catalog.create_location(NewLocation {
        name: "Customer site".into(),
        kind: LocationType::External,
        contact_info: "dock 4".into(),
        ..Default::default()
    })?;
    let item = catalog.create_item(NewItem {
        code: "WRAP-500".into(),
        description: "Stretch wrap, 500mm".into(),
        ..Default::default()
    })?;
    catalog.set_stock(item.id.as_str(), main.id.as_str(), &Quantity::new(10, 6).into())?;

    let clerk = UserId::new();
    let manager = UserId::new();
    let metadata = || Metadata::new().with("ip", Some("127.0.0.1"));

    let request = service
        .propose(
            &ProposedMovement {
                item_id: item.id.to_string(),
                kind: None,
                from_location_id: main.id.to_string(),
                to_location_id: customer.id.to_string(),
                quantity: Quantity::new(3, 2).into(),
                reason: "weekly delivery".into(),
            },
            &clerk,
            metadata(),
        )
        .context("proposal refused")?;

    let oversized = service.propose(
        &ProposedMovement {
            item_id: item.id.to_string(),
            kind: None,
            from_location_id: main.id.to_string(),
            to_location_id: customer.id.to_string(),
            quantity: Quantity::new(50, 0).into(),
            reason: "typo".into(),
        },
        &clerk,
        metadata(),
    )?;

    service.approve(request.id.as_str(), &manager, metadata())?;
    if let Err(e) = service.approve(oversized.id.as_str(), &manager, metadata()) {
        println!("second approval failed with {}: {e}", e.code());
        service.reject(oversized.id.as_str(), &manager, Some("over stock"), metadata())?;
    }

    let item = catalog.get_item(item.id.as_str())?;
    for (location, quantity) in item.stock.iter() {
        let name = catalog.get_location(location.as_str())?.name;
        println!("{name:>16}: {quantity}");
    }

    for request in service.list_movements(Some(status))? {
        println!("{status} {} {} ({})", request.id, request.quantity, request.reason);
    }

    for entry in service.list_logs(&LogFilter::default(), Some(10))? {
        println!("{} {:<10} {}", entry.timestamp, entry.action, entry.movement);
    }
    println!("trail intact: {}", service.verify_trail(request.id.as_str())?);

    Ok(())
}
