use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use takonbini::api::ApiServer;
use takonbini::catalog::localize::{
    format_price, is_future_release_date, jst_date, resolve_localized_text, Language,
};
use takonbini::catalog::query;
use takonbini::catalog::{AllowedValues, PublicProduct, SearchParams, DEFAULT_PAGE_LIMIT};
use takonbini::config::{self, AppConfig};
use takonbini::fetch::ProductCatalog;
use takonbini::logging::init_tracing;
use takonbini::sitemap;
use takonbini::upstream::{ProductSource, ProductsClient};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "takonbini", version, about = "Takonbini catalog service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// List products matching storefront filter parameters
    Products {
        /// Query string as it appears in the storefront URL, e.g. "stores=Lawson&maxPrice=500"
        #[arg(long, default_value = "")]
        query: String,
        /// Number of listing pages to walk (stops early when exhausted)
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Display language for titles (ja, en, zh)
        #[arg(long, default_value = "ja")]
        lang: String,
        /// Print raw JSON instead of one line per product
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show a single product as JSON
    Product { id: String },
    /// Print the sitemap XML to stdout
    Sitemap {
        /// Overrides SITE_URL
        #[arg(long)]
        site_url: Option<String>,
    },
}

fn products_client(config: &AppConfig) -> Result<ProductsClient> {
    let Some(upstream) = &config.upstream else {
        bail!("PRODUCTS_API_URL and PRODUCTS_API_KEY must be set");
    };
    ProductsClient::new(
        &upstream.base_url,
        &upstream.api_key,
        Some(upstream.timeout_secs),
    )
}

fn parse_language(raw: &str) -> Language {
    raw.parse().unwrap_or_else(|_| {
        warn!(lang = raw, "unknown language, falling back to ja");
        Language::default()
    })
}

fn print_product_line(product: &PublicProduct, language: Language) {
    let today = jst_date(chrono::Utc::now());
    let soon = if is_future_release_date(product.release_date.as_deref(), today) {
        " [soon]"
    } else {
        ""
    };
    println!(
        "{}\t{}\t{}\t{}{}",
        product.id,
        product.store,
        format_price(product.price, language),
        resolve_localized_text(&product.title, language),
        soon
    );
}

#[actix_web::main]
async fn main() -> Result<()> {
    config::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve => {
            ApiServer::from_config(config).run().await?;
        }
        Commands::Products {
            query: raw,
            pages,
            lang,
            json,
        } => {
            let language = parse_language(&lang);
            let source: Arc<dyn ProductSource> = Arc::new(products_client(&config)?);
            let catalog = ProductCatalog::new(source, config.cache);

            let mut criteria =
                query::decode(&SearchParams::from_query(&raw), &AllowedValues::default());
            criteria.limit.get_or_insert(DEFAULT_PAGE_LIMIT);
            info!(key = %criteria.key(), pages, "products: listing");

            let mut chain = catalog.load(&criteria).await?;
            while chain.pages().len() < pages.max(1) && chain.has_more() {
                let before = chain.pages().len();
                if catalog.fetch_more(&criteria).await?.is_none() {
                    break;
                }
                chain = catalog.load(&criteria).await?;
                if chain.pages().len() == before {
                    break;
                }
            }

            let products = chain.products();
            if json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else {
                for product in &products {
                    print_product_line(product, language);
                }
            }
            info!(
                products = products.len(),
                pages = chain.pages().len(),
                has_more = chain.has_more(),
                "products: done"
            );
        }
        Commands::Product { id } => {
            let client = products_client(&config)?;
            let product = client
                .fetch_product(&id)
                .await
                .with_context(|| format!("fetch product {id}"))?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        Commands::Sitemap { site_url } => {
            let configured = site_url.or(config.site_url.clone());
            let site = sitemap::resolve_site_url(configured.as_deref(), "localhost");
            let ids = match products_client(&config) {
                Ok(client) => sitemap::collect_product_ids(&client).await,
                Err(err) => {
                    warn!(error = %err, "sitemap: upstream not configured, listing root only");
                    Vec::new()
                }
            };
            println!("{}", sitemap::build_sitemap_xml(&site, &ids));
        }
    }

    Ok(())
}
