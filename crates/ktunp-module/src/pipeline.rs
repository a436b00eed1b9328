//! `Pipeline` — the compositor that wires registry, dispatcher and sources.
//!
//! ```text
//! source ──deliver──▶ Dispatcher ──notify──▶ WatchRegistry ──eventfd──▶ WatchHandle
//!                        │                        ▲
//!                   NexthopResolver          ControlPlane
//! ```
//!
//! Startup is ordered and all-or-nothing; teardown runs in reverse.

use ktunp_core::error::Result;
use ktunp_core::source::{
    AddrEventSource, EventSink, NexthopEventSource, NexthopResolver, Stream, Subscription,
};
use ktunp_core::watch::WatchKind;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::control::ControlPlane;
use crate::dispatcher::{ConfirmedByNotifier, Dispatcher};
use crate::registry::{WatchHandle, WatchRegistry};

/// Dispatcher as wired by the pipeline.
pub type PipelineDispatcher = Dispatcher<WatchRegistry, Box<dyn NexthopResolver>>;

/// Builder for a running pipeline.
pub struct PipelineBuilder {
    config: PipelineConfig,
    resolver: Box<dyn NexthopResolver>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            resolver: Box::new(ConfirmedByNotifier),
        }
    }

    /// Replace the default `ConfirmedByNotifier` next-hop lookup.
    pub fn resolver(mut self, resolver: impl NexthopResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Start the pipeline.
    ///
    /// 1. Allocates the registry and its readiness channels
    /// 2. Applies initial targets from the config
    /// 3. Subscribes the address stream
    /// 4. Subscribes the next-hop stream once per configured namespace
    ///
    /// On failure everything acquired so far is released in reverse order
    /// and the error is returned.
    pub fn build<A, N>(self, addr_source: &A, nexthop_source: &N) -> Result<Pipeline>
    where
        A: AddrEventSource + ?Sized,
        N: NexthopEventSource + ?Sized,
    {
        // 1. Registry
        let registry = Arc::new(WatchRegistry::new(self.config.max_waiters)?);

        // 2. Initial targets
        let initial = [
            (WatchKind::NextHop, self.config.nexthop.as_deref()),
            (WatchKind::InetAddr, self.config.inetaddr.as_deref()),
        ];
        for (kind, literal) in initial {
            let Some(literal) = literal else { continue };
            if let Err(e) = registry.write(kind, literal.as_bytes()) {
                warn!(watch = kind.name(), literal, error = %e, "initial target rejected");
            }
        }

        let dispatcher = Arc::new(Dispatcher::with_resolver(Arc::clone(&registry), self.resolver));
        let sink: Arc<dyn EventSink> = dispatcher.clone();

        let mut pipeline = Pipeline {
            config: self.config,
            registry,
            dispatcher,
            subscriptions: Vec::new(),
        };

        // 3. Address stream
        let sub = addr_source.subscribe_addr(Arc::clone(&sink))?;
        pipeline.subscriptions.push(sub);

        // 4. Next-hop stream per namespace. An early return drops
        //    `pipeline`, which unwinds the subscriptions taken so far.
        for i in 0..pipeline.config.namespaces.len() {
            let netns = pipeline.config.namespaces[i];
            let sub = nexthop_source.subscribe_nexthop(netns, Arc::clone(&sink))?;
            pipeline.subscriptions.push(sub);
        }

        info!(
            max_waiters = pipeline.config.max_waiters,
            subscriptions = pipeline.subscriptions.len(),
            "pipeline started"
        );
        Ok(pipeline)
    }
}

/// A running pipeline.
///
/// Dropping it (or calling `shutdown()`) unsubscribes from every source
/// in reverse order of acquisition. Open `WatchHandle`s stay valid and
/// simply stop receiving triggers.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<WatchRegistry>,
    dispatcher: Arc<PipelineDispatcher>,
    subscriptions: Vec<Box<dyn Subscription>>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    pub fn control(&self) -> ControlPlane {
        ControlPlane::new(Arc::clone(&self.registry))
    }

    pub fn dispatcher(&self) -> &Arc<PipelineDispatcher> {
        &self.dispatcher
    }

    /// Open a pollable handle on watch `kind`.
    pub fn open(&self, kind: WatchKind) -> Result<WatchHandle> {
        self.registry.open(kind)
    }

    /// Streams currently subscribed, in acquisition order.
    pub fn streams(&self) -> impl Iterator<Item = Stream> + '_ {
        self.subscriptions.iter().map(|s| s.stream())
    }

    /// Subscribed streams whose source has stopped delivering.
    pub fn dead_streams(&self) -> impl Iterator<Item = Stream> + '_ {
        self.subscriptions.iter().filter(|s| !s.is_live()).map(|s| s.stream())
    }

    /// Unsubscribe from every source. Idempotent.
    pub fn shutdown(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        while let Some(sub) = self.subscriptions.pop() {
            let stream = sub.stream();
            drop(sub);
            info!(%stream, "unsubscribed");
        }
        info!("pipeline shut down");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
