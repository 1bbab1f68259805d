//! Counter demo.
//!
//! Run with `RUST_LOG=debug cargo run -p counter` to see the dispatch spans.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use courier::prelude::*;
use courier::runtime::ConfigLoader;
use thiserror::Error;
use tracing::info;

// =============================================================================
// Messages
// =============================================================================

struct Increment {
    by: i64,
}
command!(Increment => i64);

struct Reset;
command!(Reset);

struct CurrentTotal;
query!(CurrentTotal => i64);

struct TotalChanged {
    total: i64,
}
event!(TotalChanged);

// =============================================================================
// State and handlers
// =============================================================================

#[derive(Default)]
struct Store(AtomicI64);

#[derive(Debug, Error)]
#[error("increment must be between 1 and 100, got {0}")]
struct InvalidIncrement(i64);

struct IncrementHandler {
    store: Arc<Store>,
    // Set once the runtime is built.
    mediator: Arc<OnceLock<Mediator>>,
}

#[async_trait]
impl Handler<Increment> for IncrementHandler {
    async fn handle(&self, cmd: &Increment, token: &CancellationToken) -> Result<i64, BoxError> {
        let total = self.store.0.fetch_add(cmd.by, Ordering::SeqCst) + cmd.by;
        if let Some(mediator) = self.mediator.get() {
            mediator
                .publish_with_token(TotalChanged { total }, token.clone())
                .await?;
        }
        Ok(total)
    }
}

struct ResetHandler(Arc<Store>);

#[async_trait]
impl Handler<Reset> for ResetHandler {
    async fn handle(&self, _: &Reset, _: &CancellationToken) -> Result<(), BoxError> {
        self.0.0.store(0, Ordering::SeqCst);
        Ok(())
    }
}

struct TotalHandler(Arc<Store>);

#[async_trait]
impl Handler<CurrentTotal> for TotalHandler {
    async fn handle(&self, _: &CurrentTotal, _: &CancellationToken) -> Result<i64, BoxError> {
        Ok(self.0.0.load(Ordering::SeqCst))
    }
}

struct ValidateIncrement;

#[async_trait]
impl PreProcessor<Increment> for ValidateIncrement {
    async fn process(&self, cmd: &Increment, _: &CancellationToken) -> Result<(), BoxError> {
        if !(1..=100).contains(&cmd.by) {
            return Err(InvalidIncrement(cmd.by).into());
        }
        Ok(())
    }
}

struct AuditIncrement;

#[async_trait]
impl PostProcessor<Increment> for AuditIncrement {
    async fn process(
        &self,
        cmd: &Increment,
        total: &i64,
        _: &CancellationToken,
    ) -> Result<(), BoxError> {
        info!(by = cmd.by, total, "Increment applied");
        Ok(())
    }
}

struct AnnounceTotal;

#[async_trait]
impl Handler<TotalChanged> for AnnounceTotal {
    async fn handle(&self, event: &TotalChanged, _: &CancellationToken) -> Result<(), BoxError> {
        println!("total is now {}", event.total);
        Ok(())
    }
}

// =============================================================================
// Wiring
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(Store::default());
    let slot: Arc<OnceLock<Mediator>> = Arc::new(OnceLock::new());

    let mut container = Container::new();
    let shared = store.clone();
    let lookup = slot.clone();
    container
        .register_transient(move |_: &dyn Resolver| {
            Ok(IncrementHandler {
                store: shared.clone(),
                mediator: lookup.clone(),
            })
        })
        .register_singleton({
            let store = store.clone();
            move |_: &dyn Resolver| Ok(ResetHandler(store.clone()))
        })
        .register_singleton({
            let store = store.clone();
            move |_: &dyn Resolver| Ok(TotalHandler(store.clone()))
        })
        .register_instance(ValidateIncrement)
        .register_instance(AuditIncrement)
        .register_instance(AnnounceTotal);

    let mut builder = CourierRuntime::builder()
        .resolver(Arc::new(container))
        .load_config_with(ConfigLoader::new().with_current_dir())?
        .with_logging();
    builder
        .registry_mut()
        .register_command::<Increment, IncrementHandler>()?
        .register_command::<Reset, ResetHandler>()?
        .register_query::<CurrentTotal, TotalHandler>()?
        .register_event::<TotalChanged, AnnounceTotal>()?
        .register_pre::<Increment, ValidateIncrement>()?
        .register_post::<Increment, AuditIncrement>()?;

    let runtime = builder.build()?;
    let mediator = runtime.mediator().clone();
    let _ = slot.set(mediator.clone());

    for by in [5, 10, 250] {
        match mediator.send_command(Increment { by }).await {
            Ok(total) => info!(total, "Incremented"),
            Err(err) => match err.downcast_ref::<InvalidIncrement>() {
                Some(invalid) => info!(%invalid, "Rejected"),
                None => return Err(err.into()),
            },
        }
    }

    let total = mediator.send_query(CurrentTotal).await?;
    println!("final total: {total}");

    mediator.send_command(Reset).await?;
    assert_eq!(mediator.send_query(CurrentTotal).await?, 0);
    Ok(())
}
