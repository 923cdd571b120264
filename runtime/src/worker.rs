//! Channel worker - the task that owns one channel
//!
//! Each channel runs in its own task and is the only writer of its
//! [`ChannelMachine`], so no locking is needed and channels never serialize
//! against each other. Inbound events are polled before the timer
//! (`biased` select): an update that is ready at the same instant as an
//! injection tick always wins, and the tick is discarded with the old phase.

use crate::channel::{ChannelMachine, Wake};
use crate::status::ChannelSnapshot;
use futures_util::StreamExt;
use futures_util::stream::{self, SelectAll};
use heartwire_core::{BusAdapter, BusEvent, Subscription};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type EventStream = Pin<Box<dyn futures_util::Stream<Item = BusEvent> + Send>>;

pub(crate) struct ChannelWorker {
    pub machine: ChannelMachine,
    pub bus: Arc<dyn BusAdapter>,
    pub primary: Subscription,
    pub companions: Vec<Subscription>,
    pub status: watch::Sender<ChannelSnapshot>,
    pub cancel: CancellationToken,
}

impl ChannelWorker {
    pub async fn run(self) {
        let ChannelWorker {
            mut machine,
            bus,
            mut primary,
            companions,
            status,
            cancel,
        } = self;
        let emitter = machine.emitter().clone();

        let mut companion_events: SelectAll<EventStream> =
            stream::select_all(companions.into_iter().map(into_stream));
        let mut primary_open = true;
        let mut companions_open = !companion_events.is_empty();

        tracing::debug!(state = %machine.state(), "Channel worker started");

        loop {
            let wakeup = machine.next_wakeup();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = primary.recv(), if primary_open => match event {
                    Some(event) => {
                        let outcome = machine.on_primary(&event, Instant::now());
                        tracing::trace!(?outcome, value = %event.value, "Primary update");
                    }
                    None => {
                        tracing::warn!(
                            path = %primary.path(),
                            "Primary subscription closed by bus"
                        );
                        primary_open = false;
                    }
                },

                event = companion_events.next(), if companions_open => match event {
                    Some(event) => {
                        let outcome = machine.on_companion(&event);
                        tracing::trace!(?outcome, path = %event.path, "Companion update");
                    }
                    None => companions_open = false,
                },

                _ = sleep_until(wakeup) => match machine.on_timer(Instant::now()) {
                    Wake::StartedInjecting(delta) => {
                        persist_last_value(bus.as_ref(), &machine).await;
                        if emitter.emit(bus.as_ref(), delta).await.is_err() {
                            machine.record_publish_failure();
                        }
                    }
                    Wake::Tick(delta) => {
                        if emitter.emit(bus.as_ref(), delta).await.is_err() {
                            machine.record_publish_failure();
                        }
                    }
                    Wake::Silenced => {
                        tracing::info!("Channel silent with no value to replay");
                    }
                    Wake::Idle => {}
                },
            }

            status.send_replace(machine.snapshot());
        }

        primary.release();
        drop(companion_events);
        persist_last_value(bus.as_ref(), &machine).await;
        status.send_replace(machine.snapshot());
        tracing::debug!("Channel worker stopped");
    }
}

fn into_stream(subscription: Subscription) -> EventStream {
    Box::pin(stream::unfold(subscription, |mut sub| async move {
        sub.recv().await.map(|event| (event, sub))
    }))
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn persist_last_value(bus: &dyn BusAdapter, machine: &ChannelMachine) {
    let Some(value) = machine.last_value() else {
        return;
    };
    let key = machine.channel().persist_key();
    if let Err(err) = bus.write_persisted(&key, value.clone()).await {
        tracing::warn!(key = %key, error = %err, "Failed to persist last value");
    }
}
