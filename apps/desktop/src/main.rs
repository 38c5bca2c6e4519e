use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{CatalogLoader, HttpPlaceStore, SelectionController, SelectionEvent};
use shared::domain::PlaceId;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: String,
    /// Catalog ids to add to the selection.
    #[arg(long)]
    select: Vec<String>,
    /// Selected ids to remove (each removal is confirmed).
    #[arg(long)]
    remove: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let store = Arc::new(HttpPlaceStore::new(args.server_url));

    let catalog = CatalogLoader::new(store.clone());
    catalog.initialize().await;
    if let Some(error) = catalog.error().await {
        println!("Catalog unavailable: {error}");
        return Ok(());
    }
    let candidates = catalog.available_places().await;
    println!("Available places:");
    for place in &candidates {
        println!("  {} - {}", place.id, place.title);
    }

    let controller = SelectionController::new(store);
    controller.initialize().await;
    if let Some(error) = controller.load_error().await {
        println!("Stored selection unavailable: {error}");
        return Ok(());
    }
    let mut events = controller.subscribe_events();

    for id in &args.select {
        let Some(place) = candidates.iter().find(|p| p.id.as_str() == id) else {
            println!("Unknown catalog id '{id}', skipping");
            continue;
        };
        if controller
            .selected_places()
            .await
            .iter()
            .any(|p| p.id.as_str() == id)
        {
            println!("'{id}' is already selected");
            continue;
        }
        controller.select(place.clone()).await;
        wait_for_write(&mut events).await;
    }

    for id in &args.remove {
        controller.request_removal(PlaceId::from(id.as_str())).await;
        if !controller.is_removal_confirmation_open().await {
            println!("'{id}' is not selected, skipping");
            continue;
        }
        controller.confirm_removal().await;
        wait_for_write(&mut events).await;
    }

    println!("Selected places:");
    for place in controller.selected_places().await {
        println!("  {} - {}", place.id, place.title);
    }
    if let Some(error) = controller.sync_error().await {
        println!("Last sync error: {error}");
    }

    Ok(())
}

async fn wait_for_write(events: &mut broadcast::Receiver<SelectionEvent>) {
    loop {
        match events.recv().await {
            Ok(SelectionEvent::Synced) => break,
            Ok(SelectionEvent::SyncFailed { message }) => {
                println!("Sync failed: {message}");
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}
