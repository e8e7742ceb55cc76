use anyhow::Context;
use archive_host::config::{
    DEFAULT_FIRST_DOC_PORT, DEFAULT_LISTEN_PORT, LOCKIN_FILE, ServerConfig,
};
use archive_host::executor::registry::ExecutorRegistry;
use archive_host::executor::types::ExecutorConfig;
use archive_host::ports::{PortAllocator, SYSTEM_TENANT, SharedPorts};
use archive_host::server::{serve, system_router, tenant_router};
use archive_host::tenant::{TenantHost, TokenIssuer};
use clap::Parser;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Serves per-tenant document archives, each on its own port.
#[derive(Parser, Debug)]
#[command(name = "archive-host")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration directory.
    #[arg(long, default_value = ".")]
    config: PathBuf,

    /// Port of the system tenant.
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    port: u16,

    /// First port scanned for document tenants.
    #[arg(long, default_value_t = DEFAULT_FIRST_DOC_PORT)]
    docport: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    // 1. Configuration:
    std::fs::create_dir_all(&cli.config)
        .with_context(|| format!("failed to create {}", cli.config.display()))?;
    let config = ServerConfig::load_or_init(&cli.config)?;
    let lockin_path = cli.config.join(LOCKIN_FILE);

    // 2. Ports:
    let mut allocator = PortAllocator::new(
        config.bind_host,
        cli.docport,
        config.max_port_probes,
        SYSTEM_TENANT,
    );
    allocator
        .register_fixed(SYSTEM_TENANT, cli.port)
        .with_context(|| format!("system port {} unavailable", cli.port))?;
    let restored = allocator.restore(&lockin_path);
    tracing::info!("Restored {} port lock-ins", restored);

    for tenant in &config.tenants {
        let port = allocator.bind(&tenant.name)?;
        tracing::info!("Tenant {} on port {}", tenant.name, port);
    }
    let ports: SharedPorts = Arc::new(RwLock::new(allocator));

    // 3. Executors and tenant hosts:
    let registry = ExecutorRegistry::new(ExecutorConfig {
        event_capacity: config.event_buffer,
    });
    let tokens = TokenIssuer::new();

    let mut servers = Vec::new();
    let system = TenantHost::new(
        SYSTEM_TENANT,
        cli.port,
        registry.get_or_create(
            SYSTEM_TENANT,
            &config.storage_path(&cli.config, SYSTEM_TENANT),
        ),
        tokens.clone(),
    );
    servers.push((
        ports.read().listener(SYSTEM_TENANT)?,
        system_router(system, ports.clone()),
    ));

    for tenant in &config.tenants {
        let (port, listener) = {
            let ports = ports.read();
            let port = ports
                .port_of(&tenant.name)
                .with_context(|| format!("tenant {} lost its port", tenant.name))?;
            (port, ports.listener(&tenant.name)?)
        };
        let executor = registry.get_or_create(
            &tenant.name,
            &config.storage_path(&cli.config, &tenant.name),
        );
        let host = TenantHost::new(&tenant.name, port, executor, tokens.clone());
        servers.push((listener, tenant_router(host)));
    }

    ports.read().persist(&lockin_path)?;

    // 4. Start HTTP servers:
    let mut tasks = Vec::new();
    for (listener, app) in servers {
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(listener, app).await {
                tracing::error!("HTTP server failed: {}", e);
            }
        }));
    }

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    // 5. Shutdown:
    tracing::info!("Shutting down");
    registry.terminate_all();
    for task in &tasks {
        task.abort();
    }
    {
        let mut ports = ports.write();
        if let Err(e) = ports.persist(&lockin_path) {
            tracing::warn!("Failed to save port lock-ins: {}", e);
        }
        ports.close_all();
    }

    Ok(())
}
