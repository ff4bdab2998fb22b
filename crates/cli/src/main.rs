//! MelyMarck CLI - drive the storefront client from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password is read from stdin) and keep the session for a week
//! echo "$PASSWORD" | mely login -u maria --remember-me
//!
//! # Show the cart and change a line's quantity
//! mely cart show
//! mely cart set 7 4
//!
//! # Remove a line without the confirmation prompt
//! mely cart remove 9 --yes
//!
//! # Order history and payment proof
//! mely orders list
//! mely orders upload-receipt 31 --method yape --file voucher.png
//!
//! # Browse products and pick a delivery address
//! mely catalog products --category 3 --max-price 50
//! mely addresses select 2
//! ```
//!
//! # Commands
//!
//! - `login` / `google-login` / `logout` / `whoami` - Session management
//! - `cart show|set|inc|dec|remove|count|checkout` - Cart operations
//! - `orders list|cancel|upload-receipt` - Order history
//! - `catalog categories|subcategories|products` - Catalog browsing
//! - `addresses list|add|edit|select|remove` - Delivery addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mely_client::addresses::AddressForm;
use mely_client::catalog::ProductFilter;
use mely_client::{ClientConfig, Storefront};
use mely_core::{AddressId, CategoryId, LineId, OrderId, SubcategoryId};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mely")]
#[command(author, version, about = "MelyMarck storefront CLI")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with username and password (password read from stdin)
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Keep the session for a week instead of a day
        #[arg(long)]
        remember_me: bool,
    },
    /// Sign in with a Google identity token (read from stdin)
    GoogleLogin,
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in role and cart
    Whoami,
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect and manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Browse the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Manage delivery addresses
    Addresses {
        #[command(subcommand)]
        action: AddressesAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and the total
    Show,
    /// Set a line's quantity (1-10)
    Set {
        /// Cart line id
        line: LineId,
        /// New quantity
        quantity: i64,
    },
    /// Add one unit to a line
    Inc {
        /// Cart line id
        line: LineId,
    },
    /// Remove one unit from a line
    Dec {
        /// Cart line id
        line: LineId,
    },
    /// Remove a line from the cart
    Remove {
        /// Cart line id
        line: LineId,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the authoritative item count
    Count,
    /// Check that the cart can be checked out
    Checkout,
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders
    List,
    /// Cancel a pending order
    Cancel {
        /// Order id
        order: OrderId,
    },
    /// Upload proof of payment for an order
    UploadReceipt {
        /// Order id
        order: OrderId,

        /// Payment method (`yape` or `bank-deposit`)
        #[arg(short, long)]
        method: String,

        /// Receipt image or PDF
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List categories
    Categories {
        /// Include inactive categories (administrators only)
        #[arg(long)]
        all: bool,
    },
    /// List subcategories
    Subcategories {
        /// Parent category id
        #[arg(short, long)]
        category: Option<CategoryId>,

        /// Include inactive subcategories (administrators only)
        #[arg(long)]
        all: bool,
    },
    /// List products, one page at a time
    Products {
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        #[arg(long)]
        category: Option<CategoryId>,

        #[arg(long)]
        subcategory: Option<SubcategoryId>,

        /// Match on product name
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        min_price: Option<Decimal>,

        #[arg(long)]
        max_price: Option<Decimal>,
    },
}

/// Fields of a delivery address.
#[derive(Args)]
struct AddressArgs {
    #[arg(long)]
    department: String,

    #[arg(long)]
    province: String,

    #[arg(long)]
    district: String,

    /// Street address of the Shalom agency
    #[arg(long)]
    agency: String,
}

impl From<AddressArgs> for AddressForm {
    fn from(args: AddressArgs) -> Self {
        Self {
            department: args.department,
            province: args.province,
            district: args.district,
            agency: args.agency,
        }
    }
}

#[derive(Subcommand)]
enum AddressesAction {
    /// List saved addresses; the selected one is starred
    List,
    /// Save a new address
    Add(AddressArgs),
    /// Replace an address
    Edit {
        /// Address id
        address: AddressId,

        #[command(flatten)]
        fields: AddressArgs,
    },
    /// Ship orders to this address
    Select {
        /// Address id
        address: AddressId,
    },
    /// Delete an address
    Remove {
        /// Address id
        address: AddressId,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Map tracing levels to Sentry events: errors and warnings become events,
/// info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mely_client=info,mely=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storefront = Storefront::connect(config)?;
    storefront
        .transport()
        .set_maintenance_callback(|active, message| {
            if active {
                tracing::warn!(%message, "Store is in maintenance mode");
            } else {
                tracing::info!("Store is back from maintenance");
            }
        });

    let output = commands::Output { json: cli.json };

    match cli.command {
        Commands::Login {
            username,
            remember_me,
        } => commands::account::login(&storefront, &username, remember_me, output).await?,
        Commands::GoogleLogin => commands::account::google_login(&storefront, output).await?,
        Commands::Logout => commands::account::logout(&storefront).await,
        Commands::Whoami => commands::account::whoami(&storefront, output),
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront, output).await?,
            CartAction::Set { line, quantity } => {
                commands::cart::set(&storefront, line, quantity, output).await?;
            }
            CartAction::Inc { line } => commands::cart::step(&storefront, line, 1, output).await?,
            CartAction::Dec { line } => commands::cart::step(&storefront, line, -1, output).await?,
            CartAction::Remove { line, yes } => {
                commands::cart::remove(&storefront, line, yes, output).await?;
            }
            CartAction::Count => commands::cart::count(&storefront, output).await?,
            CartAction::Checkout => commands::cart::checkout(&storefront, output).await?,
        },
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::orders::list(&storefront, output).await?,
            OrdersAction::Cancel { order } => commands::orders::cancel(&storefront, order).await?,
            OrdersAction::UploadReceipt {
                order,
                method,
                file,
            } => commands::orders::upload_receipt(&storefront, order, &method, &file).await?,
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Categories { all } => {
                commands::catalog::categories(&storefront, all, output).await?;
            }
            CatalogAction::Subcategories { category, all } => {
                commands::catalog::subcategories(&storefront, category, all, output).await?;
            }
            CatalogAction::Products {
                page,
                category,
                subcategory,
                name,
                min_price,
                max_price,
            } => {
                let filter = ProductFilter {
                    category,
                    subcategory,
                    name,
                    min_price,
                    max_price,
                };
                commands::catalog::products(&storefront, page, &filter, output).await?;
            }
        },
        Commands::Addresses { action } => match action {
            AddressesAction::List => commands::addresses::list(&storefront, output).await?,
            AddressesAction::Add(fields) => {
                commands::addresses::add(&storefront, &fields.into()).await?;
            }
            AddressesAction::Edit { address, fields } => {
                commands::addresses::edit(&storefront, address, &fields.into()).await?;
            }
            AddressesAction::Select { address } => {
                commands::addresses::select(&storefront, address).await?;
            }
            AddressesAction::Remove { address, yes } => {
                commands::addresses::remove(&storefront, address, yes).await?;
            }
        },
    }
    Ok(())
}
