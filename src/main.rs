//! Los Libros CFI tool
//!
//! Generates locations for an unpacked EPUB and prints them as JSON. With a
//! CFI argument it prints that position's location and covered text instead.

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use los_libros_cfi::cfi::CfiEngine;
use los_libros_cfi::epub::{open_package, Book, DirectoryLoader};
use los_libros_cfi::locations::Locations;
use los_libros_cfi::pagelist::{read_page_list, PageList};
use los_libros_cfi::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so RUST_LOG from it reaches the filter
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "los_libros_cfi=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let mut args = std::env::args().skip(1);
    let Some(dir) = args.next() else {
        bail!("usage: los-libros-cfi <unpacked-epub-dir> [cfi]");
    };
    let cfi = args.next();

    let loader = DirectoryLoader::new(&dir);
    let package = open_package(&loader)
        .await
        .with_context(|| format!("opening {}", dir))?;
    tracing::info!(
        "{}: {} spine items ({} linear)",
        dir,
        package.spine.len(),
        package.spine.linear().count()
    );

    let engine = CfiEngine::new(config.cfi.clone());
    let mut locations = Locations::new(config.locations.clone(), engine.clone());
    locations.generate(&package.spine, &loader, None).await?;

    match read_page_list(&package, &loader).await {
        Ok(items) if !items.is_empty() => {
            let pages = PageList::with_engine(&items, engine.clone());
            tracing::info!(
                "Page list: {} pages ({}-{})",
                pages.len(),
                pages.first_page(),
                pages.last_page()
            );
        }
        Ok(_) => tracing::debug!("No page list"),
        Err(e) => tracing::warn!("Failed to read page list: {}", e),
    }

    let Some(cfi) = cfi else {
        println!("{}", locations.save()?);
        return Ok(());
    };

    let changed = locations.set_current(cfi.as_str())?;
    let book = Book::new(package.spine.clone(), loader, engine);
    let range = book.get_range(&cfi).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "location": changed,
            "range": range,
        }))?
    );

    Ok(())
}
