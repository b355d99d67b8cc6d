// poolkeeper - generic async resource pooling
//
// Small demo binary; the library lives in lib.rs.
// Run the demos with: cargo run --example basic

use poolkeeper::{ManagerConfig, PoolConfig, PoolManager, PoolResult};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== poolkeeper v{} ===", env!("CARGO_PKG_VERSION"));
    println!("See the demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let manager = PoolManager::new(ManagerConfig::default());
    let buffers = manager
        .create_buffer_pool("buffers", 4096, PoolConfig::new().with_min(2).with_max(8))
        .await?;

    {
        let mut buf = buffers.borrow().await?;
        buf[..5].copy_from_slice(b"hello");
        println!("  Borrowed buffer {} ({} bytes)", buf.id(), buf.len());
        buffers.release(buf).await;
    }

    let stats = buffers.get_stats();
    println!("  Idle after return: {}", stats.idle);
    println!("  Health: {}", manager.health_check().status);

    manager.destroy().await;
    Ok(())
}
