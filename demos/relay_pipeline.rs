//! # Relay pipeline
//!
//! Demonstrates:
//! - A stage chain: quarantine filter → parsing transform → batcher → relay
//! - Bad input isolated by the quarantine filter instead of crashing the bus
//! - Two consumer jobs draining the relay, each driving its own bus
//! - A supervisor turning the consumers' completion into a single stop
//! - Progress events logged through `tracing`
//!
//! Run with: `cargo run --example relay_pipeline --features logging`

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use beanbus::{
    BadBeanFilter, BadBeanTransfer, Batcher, Bus, BusError, Collector, Config, Decision, Driver,
    IterSource, JobError, JobFn, LogWriter, ProgressBus, Relay, StatefulBusSupervisor,
    StatefulJob, Subscribe, SubscriberSet, Transform,
};

const ORDERS: [&str; 9] = [
    "apples:3", "pears:2", "plums:x", "figs:7", "kiwis:1", "limes:4", "dates", "cherries:5",
    "grapes:6",
];

/// Parses `name:quantity`; malformed lines are bad beans.
fn quantity(line: &'static str) -> Result<u32, BusError> {
    let (_, qty) = line
        .split_once(':')
        .ok_or_else(|| BusError::bad_bean(format!("{line}: missing quantity")))?;
    qty.parse()
        .map_err(|e| BusError::bad_bean(format!("{line}: {e}")))
}

/// A job that drives its own bus from the relay, summing every batch it gets.
fn consumer_job(name: &'static str, relay: Arc<Relay<Vec<u32>>>, sums: Arc<Collector<u32>>) -> Arc<StatefulJob> {
    StatefulJob::new(JobFn::arc(name, move |ctx: CancellationToken| {
        let relay = relay.clone();
        let sums = sums.clone();
        async move {
            let bus = Bus::<Vec<u32>>::new(name);
            let sum: Arc<Transform<Vec<u32>, u32>> =
                Arc::new(Transform::map(|batch: Vec<u32>| batch.iter().sum()).with_to(sums));
            bus.set_to(sum);

            let outcome = Driver::new(name, bus)
                .run(relay.consumer(ctx.clone()), &ctx)
                .await?;
            tracing::info!(consumer = name, batches = outcome.accepted, "consumer drained");
            Ok::<_, JobError>(())
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config {
        name: "orders".into(),
        relay_capacity: 2,
        ..Config::default()
    };

    let progress = ProgressBus::from_config(&cfg);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut subscribers = SubscriberSet::new(subs, progress.clone());
    subscribers.listen();

    // orders ─► quarantine ─► parse ─► batch(3) ─► relay
    let orders = Bus::<&'static str>::with_config(&cfg);
    let relay = orders.attach(Arc::new(Relay::<Vec<u32>>::from_config(&cfg)));
    let batcher = orders.attach(Arc::new(
        Batcher::<u32>::new(3)
            .with_to(relay.clone())
            .with_bus_conductor(&orders),
    ));
    let parse: Arc<Transform<&'static str, u32>> =
        Arc::new(Transform::try_map(quantity).with_to(batcher));
    let rejected = Arc::new(Collector::<BadBeanTransfer<&'static str>>::new());
    let quarantine = orders.attach(Arc::new(
        BadBeanFilter::<&'static str>::new()
            .with_to(parse)
            .with_handler(rejected.clone()),
    ));
    orders.set_to(quarantine);

    // two consumers, supervised as one unit
    let sums = Arc::new(Collector::<u32>::new());
    let consumers = vec![
        consumer_job("consumer-a", relay.clone(), sums.clone()),
        consumer_job("consumer-b", relay.clone(), sums.clone()),
    ];
    let supervisor = StatefulBusSupervisor::new(
        || tracing::info!("all consumers finished"),
        |cause| tracing::warn!(error = %cause, "a consumer failed"),
    );
    let supervision = supervisor.supervise(consumers.clone());
    supervision.run()?;

    let token = CancellationToken::new();
    for job in &consumers {
        job.launch(token.clone());
    }

    let produced = Driver::new("orders", orders)
        .with_progress(progress)
        .run(IterSource::new(ORDERS), &token)
        .await?;

    let decision = supervision.finished().await;
    subscribers.shutdown().await;

    let total: u32 = sums.items().iter().sum();
    println!("accepted {} orders, total quantity {total}", produced.accepted);
    for bad in rejected.take() {
        println!("rejected {:?}: {}", bad.bean, bad.failure);
    }
    if let Decision::Crashed(cause) = decision {
        return Err(cause.into());
    }
    Ok(())
}
