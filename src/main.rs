use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use txsync::resource::MemoryResourceFactory;
use txsync::{Propagation, ScopeDefinition, SyncContext, manager};

/// Walk through one scope with an in-memory resource factory and report
/// what happened to the resource.
#[derive(Parser)]
#[command(name = "txsync")]
#[command(about = "Demonstrates scope-bound resource synchronization")]
struct Cli {
    /// Scope descriptor, e.g. "PROPAGATION_REQUIRED,readOnly,timeout_30"
    #[arg(long, default_value = "PROPAGATION_REQUIRED")]
    descriptor: String,

    /// How many times the resource is acquired inside the scope
    #[arg(long, default_value_t = 2)]
    acquisitions: usize,

    /// Roll the scope back instead of committing
    #[arg(long)]
    rollback: bool,

    /// Run an independent inner scope (suspending the outer one) midway
    #[arg(long)]
    suspend: bool,

    /// Keep one reference unreleased so cleanup happens after completion
    #[arg(long)]
    hold: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let definition: ScopeDefinition = cli
        .descriptor
        .parse()
        .with_context(|| format!("invalid descriptor '{}'", cli.descriptor))?;
    let definition = definition.name("demo");

    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    println!("Beginning scope {}", definition);
    let scope = ctx.begin(definition)?;

    let mut acquired = Vec::with_capacity(cli.acquisitions);
    for _ in 0..cli.acquisitions {
        acquired.push(manager::acquire(&mut ctx, &factory)?);
    }

    if let Some(first) = acquired.first() {
        let mut statement = first.statement("SELECT 1")?;
        manager::apply_timeout(&ctx, &mut statement, factory.as_ref())?;
        println!(
            "Acquired resource {} {} time(s); statement timeout: {:?}",
            first.id(),
            acquired.len(),
            statement.timeout()
        );
    }

    if cli.suspend {
        let inner = ctx.begin(ScopeDefinition::new("inner").propagation(Propagation::RequiresNew))?;
        let inner_resource = manager::acquire(&mut ctx, &factory)?;
        println!(
            "Inner scope got resource {} while the outer binding is suspended",
            inner_resource.id()
        );
        manager::release(&ctx, Some(&inner_resource), factory.as_ref());
        ctx.commit(inner)?;
        println!(
            "Inner resource closed: {}; outer scope resumed: {:?}",
            inner_resource.is_closed(),
            ctx.current_scope_name()
        );
    }

    let keep = usize::from(cli.hold);
    for resource in acquired.iter().skip(keep) {
        manager::release(&ctx, Some(resource), factory.as_ref());
    }

    if cli.rollback {
        ctx.rollback(scope)?;
    } else {
        ctx.commit(scope)?;
    }

    for resource in acquired.iter().take(1) {
        println!(
            "Resource {} closed: {} (close calls: {})",
            resource.id(),
            resource.is_closed(),
            resource.close_calls()
        );
    }
    println!(
        "Bindings left: {}; resources created: {}",
        ctx.registry().len(),
        factory.created_count()
    );

    Ok(())
}
