//! # Seed Data Generator
//!
//! Populates the database with test customers and billings for development.
//!
//! ## Usage
//! ```bash
//! # Generate 50 customers with billings (default)
//! cargo run -p meridian-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p meridian-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p meridian-db --bin seed -- --db ./data/meridian.db
//! ```
//!
//! ## Generated Data
//! - Customers: a mix of companies and individuals with credit limits
//! - Billings: 0-5 open invoices per customer at the common GST rates
//!
//! Each customer gets a deterministic spread of invoice amounts so the
//! auto-apply planner has realistic partial/full coverage cases to chew on.

use std::env;

use chrono::{Duration, Utc};
use meridian_core::{CustomerType, GstRate};
use meridian_db::{Database, DbConfig};

/// Company name fragments for realistic test data
const COMPANY_PREFIXES: &[&str] = &[
    "Apex", "Summit", "Cascade", "Pinnacle", "Horizon", "Vertex", "Sterling", "Meridian",
    "Northgate", "Coastal", "Ironwood", "Lakeshore", "Bluepeak", "Redstone", "Silverline",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "Consulting", "Logistics", "Holdings", "Industries", "Services", "Trading", "Engineering",
    "Analytics", "Partners", "Solutions",
];

const PERSON_NAMES: &[&str] = &[
    "Arjun Mehta",
    "Priya Sharma",
    "Daniel Okafor",
    "Sofia Reyes",
    "Liam Carter",
    "Aisha Khan",
    "Marco Bianchi",
    "Elena Petrova",
    "Tom Whitfield",
    "Grace Liu",
];

/// GST rates in basis points
const GST_RATES: &[u32] = &[0, 500, 1200, 1800];

/// Net invoice amounts in cents, cycled per customer (GST is added on top)
const INVOICE_AMOUNTS: &[i64] = &[25_000, 50_000, 80_000, 120_000, 30_000, 65_000];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./meridian_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian CRM Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of customers to generate (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./meridian_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Meridian CRM Seed Data Generator");
    println!("===================================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", count);
    println!();

    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customers().list_active(1).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has customers");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating customers and billings...");

    let mut customers_created = 0;
    let mut billings_created = 0;
    let start = std::time::Instant::now();

    for seed in 0..count {
        let (customer_type, name) = if seed % 3 == 0 {
            (
                CustomerType::Individual,
                PERSON_NAMES[seed % PERSON_NAMES.len()].to_string(),
            )
        } else {
            (
                CustomerType::Company,
                format!(
                    "{} {}",
                    COMPANY_PREFIXES[seed % COMPANY_PREFIXES.len()],
                    COMPANY_SUFFIXES[(seed / 3) % COMPANY_SUFFIXES.len()]
                ),
            )
        };

        // Credit limit: 1,000 - 10,000 in major units
        let credit_limit_cents = 100_000 + ((seed * 37) % 900) as i64 * 1000;

        let email = format!(
            "billing+{}@{}.example.com",
            seed,
            name.to_lowercase().replace(' ', "-")
        );

        let customer = db
            .customers()
            .create(
                customer_type,
                &name,
                Some(&email),
                None,
                credit_limit_cents,
            )
            .await?;

        customers_created += 1;

        // 0-5 open billings per customer; insertion order sets created_at,
        // which is the order auto-apply walks them in
        let billing_count = seed % 6;
        for b in 0..billing_count {
            let invoice_number = format!("INV-{:04}-{:02}", seed, b + 1);
            let amount = INVOICE_AMOUNTS[(seed + b) % INVOICE_AMOUNTS.len()];
            let gst = GstRate::from_bps(GST_RATES[(seed + b) % GST_RATES.len()]);
            let due = Utc::now() + Duration::days(30 - (b as i64 * 10));

            if let Err(e) = db
                .billings()
                .create(&customer.id, &invoice_number, amount, gst, Some(due))
                .await
            {
                eprintln!("Failed to insert {}: {}", invoice_number, e);
                continue;
            }

            billings_created += 1;
        }

        if customers_created % 25 == 0 {
            println!("  Generated {} customers...", customers_created);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} customers and {} billings in {:?}",
        customers_created, billings_created, elapsed
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
