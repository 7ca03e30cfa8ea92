use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tracklink::analytics::resolver::build_cache;
use tracklink::config::Config;
use tracklink::models::{slugify, NewLink};
use tracklink::storage::{self, Storage, StorageError};

#[derive(Parser)]
#[command(name = "tracklink-admin")]
#[command(about = "Tracklink link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tracked link
    Create {
        /// Human readable title
        #[arg(long)]
        title: String,
        /// Slug to serve the link under (derived from the title when omitted)
        #[arg(long)]
        slug: Option<String>,
        /// Where human visitors are sent
        #[arg(long)]
        destination: String,
        /// Where bots are sent instead; enables cloaking
        #[arg(long)]
        cloak_url: Option<String>,
    },
    /// Start redirecting a link again
    Enable { slug: String },
    /// Stop redirecting a link (visitors get a 404)
    Disable { slug: String },
    /// Delete a link and its click history
    Delete { slug: String },
    /// List all links
    List,
    /// Show the most recent clicks for a link
    Clicks {
        slug: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Delete recorded clicks for one link, or for all links
    PurgeClicks { slug: Option<String> },
    /// Drop every cached geolocation entry
    ClearGeoCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let command = match cli.command {
        Commands::ClearGeoCache => {
            let cache = build_cache(&config.geoip).await?;
            let removed = cache.clear().await?;
            println!("✓ Removed {} cached geolocation entries", removed);
            return Ok(());
        }
        command => command,
    };

    let storage = storage::connect(&config.database).await?;

    match command {
        Commands::Create {
            title,
            slug,
            destination,
            cloak_url,
        } => {
            let slug = slug.unwrap_or_else(|| slugify(&title));
            let new_link = NewLink {
                title: title.trim().to_string(),
                slug,
                destination_url: destination.trim().to_string(),
                cloaking_enabled: cloak_url.is_some(),
                cloaking_url: cloak_url.map(|url| url.trim().to_string()),
            };
            new_link.validate()?;

            match storage.create_link(&new_link).await {
                Ok(link) => {
                    println!("✓ Created link '{}' -> {}", link.slug, link.destination_url);
                    if let Some(cloak) = link.effective_cloaking_url() {
                        println!("  bots are sent to {}", cloak);
                    }
                }
                Err(StorageError::Conflict) => {
                    bail!("a link with slug '{}' already exists", new_link.slug)
                }
                Err(StorageError::Other(e)) => return Err(e),
            }
        }
        Commands::Enable { slug } => report_toggle(&*storage, &slug, true).await?,
        Commands::Disable { slug } => report_toggle(&*storage, &slug, false).await?,
        Commands::Delete { slug } => {
            if storage.delete_link(&slug).await? {
                println!("✓ Deleted link '{}' and its clicks", slug);
            } else {
                println!("⚠ No link with slug '{}'", slug);
            }
        }
        Commands::List => {
            let links = storage.list_links().await?;
            if links.is_empty() {
                println!("No links found.");
            } else {
                println!(
                    "{:<24} {:<8} {:<8} {:<20} {}",
                    "Slug", "Active", "Cloaked", "Created", "Destination"
                );
                println!("{}", "-".repeat(100));
                for link in links {
                    println!(
                        "{:<24} {:<8} {:<8} {:<20} {}",
                        link.slug,
                        yes_no(link.is_active),
                        yes_no(link.effective_cloaking_url().is_some()),
                        format_timestamp(link.created_at),
                        link.destination_url
                    );
                }
            }
        }
        Commands::Clicks { slug, limit } => {
            let link = storage
                .get_link(&slug)
                .await?
                .with_context(|| format!("no link with slug '{}'", slug))?;
            let clicks = storage.list_clicks(link.id, limit.max(1)).await?;
            if clicks.is_empty() {
                println!("No clicks recorded for '{}'.", slug);
            } else {
                println!(
                    "{:<20} {:<40} {:<8} {:<16} {:<10} {:<6} {:<4} {}",
                    "Time", "IP", "Country", "Browser", "Device", "Unique", "Bot", "Source"
                );
                println!("{}", "-".repeat(120));
                for click in clicks {
                    println!(
                        "{:<20} {:<40} {:<8} {:<16} {:<10} {:<6} {:<4} {}",
                        format_timestamp(click.created_at),
                        click.ip_address,
                        click.country_code.as_deref().unwrap_or("-"),
                        click.browser,
                        click.device_type,
                        yes_no(click.is_unique),
                        yes_no(click.is_bot),
                        click.inferred_source.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::PurgeClicks { slug } => {
            let link_id = match slug.as_deref() {
                Some(slug) => Some(
                    storage
                        .get_link(slug)
                        .await?
                        .with_context(|| format!("no link with slug '{}'", slug))?
                        .id,
                ),
                None => None,
            };
            let removed = storage.purge_clicks(link_id).await?;
            match slug {
                Some(slug) => println!("✓ Removed {} clicks for '{}'", removed, slug),
                None => println!("✓ Removed {} clicks across all links", removed),
            }
        }
        Commands::ClearGeoCache => {}
    }

    Ok(())
}

async fn report_toggle(storage: &dyn Storage, slug: &str, active: bool) -> Result<()> {
    let verb = if active { "Enabled" } else { "Disabled" };
    if storage.set_link_active(slug, active).await? {
        println!("✓ {} link '{}'", verb, slug);
    } else {
        println!("⚠ No link with slug '{}'", slug);
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn format_timestamp(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch.to_string())
}
