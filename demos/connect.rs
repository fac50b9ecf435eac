use blues_link::{AdapterConfig, Bluetooth, ScanFilter};
use futures_util::StreamExt;

#[pollster::main]
async fn main() -> blues_link::Result<()> {
    env_logger::builder()
        .filter_module("blues_link", log::LevelFilter::Debug)
        .filter_module(env!("CARGO_CRATE_NAME"), log::LevelFilter::Debug)
        .init();

    let prefix = std::env::args().nth(1);
    let config = match prefix {
        Some(prefix) => AdapterConfig::builder()
            .filter(ScanFilter::new().name_prefix(prefix))
            .build()?,
        None => AdapterConfig::builder().accept_all_devices(true).build()?,
    };

    let bluetooth = Bluetooth::ambient(config).await;
    if !bluetooth.is_supported().get() {
        eprintln!("Bluetooth is not available");
        return Ok(());
    }

    log::info!("looking for a device...");
    bluetooth.request_device().await;

    if let Some(e) = bluetooth.error().get() {
        eprintln!("error: {}", e);
        return Ok(());
    }
    if let Some(device) = bluetooth.device().get() {
        println!("selected {}", device.alias().await?);
    }
    println!("connected: {}", bluetooth.is_connected().get());

    let mut changes = bluetooth.is_connected().changes();
    while let Some(connected) = changes.next().await {
        if !connected {
            println!("device disconnected");
            break;
        }
    }

    Ok(())
}
