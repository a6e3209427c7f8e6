use clap::Parser;
use radius_accounting::{
    AccountingServer, AccountingService, AccountingStore, AuditEntry, AuditEventType, AuditLogger,
    Config, MemoryStore, PostgresStore, ServerConfig, StoreError,
};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// USG RADIUS Accounting Server - RFC 2866 accounting with quota settlement
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "usg_radius_acct")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "accounting.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(long)]
    validate: bool,
}

async fn open_store(config: &Config) -> Result<Arc<dyn AccountingStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::from_url(url).await?;
            store.migrate().await?;
            for quota in &config.subscribers {
                store.upsert_subscriber(quota).await?;
            }
            info!("Using PostgreSQL accounting store");
            Ok(Arc::new(store))
        }
        None => {
            let store = MemoryStore::new();
            for quota in &config.subscribers {
                store.add_subscriber(quota.clone()).await;
            }
            warn!("No database_url configured, accounting data is kept in memory only");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load or create configuration (without logging first)
    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("❌ Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from {}: {}", cli.config_path, e);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("✓ Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Listen: {}:{}", config.listen_address, config.listen_port);
        println!("  Clients: {}", config.clients.len());
        println!("  Subscribers: {}", config.subscribers.len());
        println!(
            "  Store: {}",
            if config.database_url.is_some() { "postgres" } else { "memory" }
        );
        println!("  Quota debit policy: {:?}", config.quota_debit_policy);
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        if let Some(ref path) = config.audit_log_path {
            println!("  Audit log: {}", path);
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("USG RADIUS Accounting Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    if config.clients.is_empty() {
        warn!("No NAS clients configured, accepting requests from ANY address with the default secret");
    } else {
        for client in &config.clients {
            let status = if client.enabled { "✓" } else { "✗" };
            let name = client.name.as_deref().unwrap_or("(unnamed)");
            info!("  {} {} - {}", status, client.address, name);
        }
    }

    let audit_logger = match AuditLogger::new(config.audit_log_path.as_deref()) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            error!("Failed to open audit log: {}", e);
            process::exit(1);
        }
    };
    if let Some(path) = audit_logger.file_path() {
        info!("Audit logging enabled: {}", path.display());
    }

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open accounting store: {}", e);
            process::exit(1);
        }
    };

    let service = AccountingService::builder(store)
        .options(config.accounting_options())
        .audit(Arc::clone(&audit_logger))
        .build();
    if let Err(e) = service.ping().await {
        error!("Accounting store is not reachable: {}", e);
        process::exit(1);
    }
    info!("Quota debit policy: {:?}", service.quota_debit_policy());

    if let Some(mut reports) = service.take_reconcile_reports() {
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                if report.is_clean() {
                    info!(nas = %report.nas, settled = report.settled, "NAS reconciled");
                } else {
                    warn!(
                        nas = %report.nas,
                        settled = report.settled,
                        failed = report.failed.len(),
                        aborted = report.aborted.as_deref().unwrap_or("-"),
                        "NAS reconciliation incomplete"
                    );
                }
            }
        });
    }

    let server_config = match ServerConfig::from_config(config, Arc::clone(&audit_logger)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let server = match AccountingServer::new(server_config, service).await {
        Ok(srv) => srv,
        Err(e) => {
            error!("Failed to create server: {}", e);
            process::exit(1);
        }
    };

    audit_logger
        .log(AuditEntry::new(AuditEventType::ServerStart).with_details(format!(
            "listening on {}",
            server
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default()
        )))
        .await;
    info!("Server started successfully! Press Ctrl+C to stop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
