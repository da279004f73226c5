//! Mutation-driven pass scheduling.
//!
//! Subscribes to tree mutations at the narrowest resolved scope and
//! coalesces bursts behind a short debounce window, last trigger wins. A
//! coarse fallback poll guarantees forward progress when notifications are
//! missed, and a navigation event forces an immediate fresh pass. After each
//! pass the subscription is moved if the observation root changed.

use crate::config::{NetworkConfig, SchedulerConfig};
use crate::emission::DeliverySink;
use crate::network::host_blocked;
use crate::notify::Notifier;
use crate::pipeline::ExtractionPipeline;
use crate::tree::{DocumentTree, MutationEvent, MutationKind, NodeId, SubscriptionId};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};
use url::Url;

pub struct MutationScheduler {
    debounce: Duration,
    poll_interval: Duration,
    extract_tags: Vec<String>,
    blocked_hosts: Vec<String>,
    notifier: Notifier,
}

impl MutationScheduler {
    pub fn from_config(
        config: &SchedulerConfig,
        network: &NetworkConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            extract_tags: config.extract_tags.clone(),
            blocked_hosts: network.blocked_hosts.clone(),
            notifier,
        }
    }

    /// Whether a mutation event should arm the debounce timer
    fn is_trigger(&self, tree: &DocumentTree, event: &MutationEvent) -> bool {
        match event.kind {
            MutationKind::Navigated => true,
            MutationKind::TextChanged | MutationKind::NodeRemoved => true,
            MutationKind::ChildAdded => event
                .added
                .iter()
                .any(|&n| self.extract_tags.iter().any(|t| t == tree.tag(n))),
        }
    }

    /// Drive passes until `shutdown` fires or the tree goes away.
    ///
    /// Everything runs on the current task; passes never overlap.
    pub async fn run<S: DeliverySink>(
        &self,
        tree: Rc<RefCell<DocumentTree>>,
        pipeline: &mut ExtractionPipeline<S>,
        mut shutdown: mpsc::UnboundedReceiver<()>,
    ) {
        let mut observed_root = pipeline.observation_root(&tree.borrow());
        let (mut sub_id, mut events) = tree.borrow_mut().subscribe(observed_root);
        info!(root = observed_root, "scheduler started");

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first interval tick fires immediately; swallow it
        poll.tick().await;

        let mut deadline = Instant::now();
        let mut armed = false;

        loop {
            tokio::select! {
                maybe = events.recv() => {
                    let event = match maybe {
                        Some(event) => event,
                        None => {
                            debug!("mutation channel closed, scheduler stopping");
                            break;
                        }
                    };
                    if event.kind == MutationKind::Navigated {
                        trace!("navigation, immediate pass forced");
                        pipeline.invalidate();
                        armed = true;
                        deadline = Instant::now();
                    } else if self.is_trigger(&tree.borrow(), &event) {
                        armed = true;
                        deadline = Instant::now() + self.debounce;
                    }
                }
                _ = tokio::time::sleep_until(deadline), if armed => {
                    armed = false;
                    self.scrub_scripts(&tree);
                    let outcome = pipeline.run_pass(&tree.borrow());
                    trace!(?outcome, "debounced pass finished");
                    self.resubscribe(&tree, pipeline, &mut observed_root, &mut sub_id, &mut events);
                }
                _ = poll.tick() => {
                    self.scrub_scripts(&tree);
                    let outcome = pipeline.run_pass(&tree.borrow());
                    trace!(?outcome, "poll pass finished");
                    self.resubscribe(&tree, pipeline, &mut observed_root, &mut sub_id, &mut events);
                }
                _ = shutdown.recv() => {
                    debug!("shutdown requested");
                    break;
                }
            }
        }
        tree.borrow_mut().unsubscribe(sub_id);
    }

    /// Remove injected script nodes whose source host is blocklisted
    fn scrub_scripts(&self, tree: &Rc<RefCell<DocumentTree>>) {
        let doomed: Vec<(NodeId, String)> = {
            let t = tree.borrow();
            let root = t.root();
            t.descendants(root)
                .into_iter()
                .filter(|&n| t.tag(n) == "script")
                .filter_map(|n| {
                    let src = t.attr(n, "src")?;
                    let url = Url::parse(src).ok()?;
                    let host = url.host_str()?;
                    host_blocked(host, &self.blocked_hosts).then(|| (n, host.to_string()))
                })
                .collect()
        };
        for (node, host) in doomed {
            debug!(host = %host, "removing blocklisted script node");
            tree.borrow_mut().remove(node);
            self.notifier.notify(format!("removed script: {host}"));
        }
    }

    /// Move the subscription whenever the observation root changes,
    /// including unresolved-to-resolved transitions.
    fn resubscribe<S: DeliverySink>(
        &self,
        tree: &Rc<RefCell<DocumentTree>>,
        pipeline: &ExtractionPipeline<S>,
        observed_root: &mut NodeId,
        sub_id: &mut SubscriptionId,
        events: &mut mpsc::UnboundedReceiver<MutationEvent>,
    ) {
        let new_root = pipeline.observation_root(&tree.borrow());
        if new_root == *observed_root {
            return;
        }
        debug!(from = *observed_root, to = new_root, "moving subscription");
        let mut tree = tree.borrow_mut();
        tree.unsubscribe(*sub_id);
        let (id, rx) = tree.subscribe(new_root);
        *sub_id = id;
        *events = rx;
        *observed_root = new_root;
    }
}
