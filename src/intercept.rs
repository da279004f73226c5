//! Policy interception over named call and append surfaces.
//!
//! Each surface is a named global the host may call into or push batches at.
//! The engine wraps every bound surface behind an accessor so rebinding by
//! the host re-wraps the new value instead of escaping interception. Calls
//! with a blocked trigger value are swallowed with one suppression
//! notification; everything else forwards unchanged, return value included.

use crate::notify::Notifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Whether a surface is invoked or appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    /// Function invocation; the trigger is the first argument
    Call,
    /// Batch mutation; the trigger is a field on each item
    Append,
}

/// One policy entry keyed by surface name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptionRule {
    pub surface: String,
    pub kind: SurfaceKind,

    /// Field inspected on each appended item; unused for call surfaces
    #[serde(default)]
    pub trigger_field: String,

    /// Trigger values that suppress the call or drop the item
    #[serde(default)]
    pub blocked: Vec<String>,

    /// Field removed from forwarded items
    #[serde(default)]
    pub scrub_field: Option<String>,

    /// Items carrying this field are dropped outright
    #[serde(default)]
    pub reject_field: Option<String>,
}

/// Underlying callable a call surface forwards to
pub trait CallSurface {
    fn invoke(&mut self, args: &[Value]) -> Option<Value>;
}

impl<F> CallSurface for F
where
    F: FnMut(&[Value]) -> Option<Value>,
{
    fn invoke(&mut self, args: &[Value]) -> Option<Value> {
        self(args)
    }
}

/// Underlying batch operation an append surface forwards to
pub trait AppendSurface {
    fn append(&mut self, items: Vec<Value>);
}

impl<F> AppendSurface for F
where
    F: FnMut(Vec<Value>),
{
    fn append(&mut self, items: Vec<Value>) {
        self(items)
    }
}

/// A bound surface value of either kind
pub enum Surface {
    Call(Box<dyn CallSurface>),
    Append(Box<dyn AppendSurface>),
}

struct Binding {
    rule: Option<InterceptionRule>,
    surface: Surface,
}

/// Rule-table-driven interception engine.
///
/// Surfaces without a matching rule forward everything untouched.
pub struct InterceptionEngine {
    rules: HashMap<String, InterceptionRule>,
    bindings: HashMap<String, Binding>,
    notifier: Notifier,
}

impl InterceptionEngine {
    pub fn new(rules: Vec<InterceptionRule>, notifier: Notifier) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.surface.clone(), r)).collect(),
            bindings: HashMap::new(),
            notifier,
        }
    }

    /// Bind a surface value under `name`. Returns false if the name is
    /// already bound; an installed surface is never wrapped twice.
    pub fn install(&mut self, name: impl Into<String>, surface: Surface) -> bool {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            debug!(surface = %name, "already installed, leaving alone");
            return false;
        }
        let rule = self.rules.get(&name).cloned();
        if rule.is_none() {
            trace!(surface = %name, "no rule for surface, pass-through binding");
        }
        self.bindings.insert(name, Binding { rule, surface });
        true
    }

    /// The host replaced the bound value; re-wrap the new one in place so
    /// interception persists across reassignment.
    pub fn rebind(&mut self, name: &str, surface: Surface) {
        match self.bindings.get_mut(name) {
            Some(binding) => {
                debug!(surface = %name, "rebinding surface");
                binding.surface = surface;
            }
            None => {
                self.install(name.to_string(), surface);
            }
        }
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Invoke a call surface. Blocked triggers are swallowed with no
    /// forwarded call and no return value.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        let binding = match self.bindings.get_mut(name) {
            Some(b) => b,
            None => {
                warn!(surface = %name, "invoke on unbound surface");
                return None;
            }
        };
        let target = match &mut binding.surface {
            Surface::Call(target) => target,
            Surface::Append(_) => {
                warn!(surface = %name, "invoke on append surface");
                return None;
            }
        };

        if let Some(rule) = &binding.rule {
            let trigger = args.first().and_then(Value::as_str);
            if let Some(value) = trigger {
                if rule.blocked.iter().any(|b| b == value) {
                    debug!(surface = %name, trigger = value, "call suppressed");
                    self.notifier.notify(format!("blocked {name}: {value}"));
                    return None;
                }
            }
        }
        target.invoke(args)
    }

    /// Push a batch at an append surface. Items whose trigger field matches
    /// a blocked value are dropped individually; the underlying append is
    /// skipped entirely when nothing survives.
    pub fn append(&mut self, name: &str, items: Vec<Value>) {
        let binding = match self.bindings.get_mut(name) {
            Some(b) => b,
            None => {
                warn!(surface = %name, "append on unbound surface");
                return;
            }
        };
        let target = match &mut binding.surface {
            Surface::Append(target) => target,
            Surface::Call(_) => {
                warn!(surface = %name, "append on call surface");
                return;
            }
        };

        let survivors = match &binding.rule {
            Some(rule) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    match filter_item(rule, item) {
                        ItemFate::Keep(item) => kept.push(item),
                        ItemFate::Drop(trigger) => {
                            debug!(surface = %name, trigger = %trigger, "item dropped");
                            self.notifier.notify(format!("blocked {name}: {trigger}"));
                        }
                    }
                }
                kept
            }
            None => items,
        };

        if survivors.is_empty() {
            trace!(surface = %name, "entire batch dropped, append skipped");
            return;
        }
        target.append(survivors);
    }
}

enum ItemFate {
    Keep(Value),
    Drop(String),
}

fn filter_item(rule: &InterceptionRule, mut item: Value) -> ItemFate {
    if let Some(obj) = item.as_object() {
        if let Some(trigger) = obj.get(&rule.trigger_field).and_then(Value::as_str) {
            if rule.blocked.iter().any(|b| b == trigger) {
                return ItemFate::Drop(trigger.to_string());
            }
        }
        if let Some(field) = &rule.reject_field {
            if obj.contains_key(field) {
                return ItemFate::Drop(field.clone());
            }
        }
    }
    if let (Some(field), Some(obj)) = (&rule.scrub_field, item.as_object_mut()) {
        obj.remove(field);
    }
    ItemFate::Keep(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterceptionConfig;
    use crate::notify::notification_channel;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine() -> (InterceptionEngine, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (notifier, rx) = notification_channel();
        let rules = InterceptionConfig::default().rules;
        (InterceptionEngine::new(rules, notifier), rx)
    }

    fn counting_call() -> (Surface, Rc<RefCell<Vec<Vec<Value>>>>) {
        let calls: Rc<RefCell<Vec<Vec<Value>>>> = Rc::new(RefCell::new(Vec::new()));
        let record = calls.clone();
        let surface = Surface::Call(Box::new(move |args: &[Value]| {
            record.borrow_mut().push(args.to_vec());
            Some(json!("ok"))
        }));
        (surface, calls)
    }

    fn counting_append() -> (Surface, Rc<RefCell<Vec<Vec<Value>>>>) {
        let batches: Rc<RefCell<Vec<Vec<Value>>>> = Rc::new(RefCell::new(Vec::new()));
        let record = batches.clone();
        let surface = Surface::Append(Box::new(move |items: Vec<Value>| {
            record.borrow_mut().push(items);
        }));
        (surface, batches)
    }

    #[test]
    fn test_blocked_call_is_swallowed_with_one_notification() {
        let (mut engine, mut rx) = engine();
        let (surface, calls) = counting_call();
        engine.install("ga", surface);

        let result = engine.invoke("ga", &[json!("pageview"), json!("/page")]);
        assert!(result.is_none());
        assert!(calls.borrow().is_empty());
        assert_eq!(rx.try_recv().unwrap(), "blocked ga: pageview");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_allowed_call_forwards_with_return_value() {
        let (mut engine, mut rx) = engine();
        let (surface, calls) = counting_call();
        engine.install("ga", surface);

        let result = engine.invoke("ga", &[json!("get"), json!("clientId")]);
        assert_eq!(result, Some(json!("ok")));
        assert_eq!(calls.borrow().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_append_drops_blocked_items_preserving_order() {
        let (mut engine, mut rx) = engine();
        let (surface, batches) = counting_append();
        engine.install("dataLayer", surface);

        engine.append(
            "dataLayer",
            vec![
                json!({"event": "page_meta", "page": "quiz"}),
                json!({"event": "click_link", "href": "/x"}),
                json!({"event": "quiz_loaded"}),
            ],
        );

        let batches = batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                json!({"event": "page_meta", "page": "quiz"}),
                json!({"event": "quiz_loaded"}),
            ]
        );
        assert_eq!(rx.try_recv().unwrap(), "blocked dataLayer: click_link");
    }

    #[test]
    fn test_fully_blocked_batch_skips_underlying_append() {
        let (mut engine, _rx) = engine();
        let (surface, batches) = counting_append();
        engine.install("optimizely", surface);

        engine.append(
            "optimizely",
            vec![json!({"type": "event"}), json!({"type": "user"})],
        );
        assert!(batches.borrow().is_empty());
    }

    #[test]
    fn test_scrub_and_reject_fields() {
        let (mut engine, _rx) = engine();
        let (surface, batches) = counting_append();
        engine.install("dataLayer", surface);

        engine.append(
            "dataLayer",
            vec![
                json!({"event": "page_meta", "session_duration": 512}),
                json!({"userId": "u-1", "event": "page_meta"}),
            ],
        );

        let batches = batches.borrow();
        assert_eq!(batches[0], vec![json!({"event": "page_meta"})]);
    }

    #[test]
    fn test_double_install_is_detected() {
        let (mut engine, mut rx) = engine();
        let (first, calls) = counting_call();
        assert!(engine.install("ga", first));
        let (second, _) = counting_call();
        assert!(!engine.install("ga", second));

        engine.invoke("ga", &[json!("pageview")]);
        assert!(calls.borrow().is_empty());
        // one notification, not two
        assert_eq!(rx.try_recv().unwrap(), "blocked ga: pageview");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rebind_keeps_interception() {
        let (mut engine, mut rx) = engine();
        let (first, _) = counting_call();
        engine.install("snowplow", first);

        // the host swaps in a fresh value after install
        let (replacement, calls) = counting_call();
        engine.rebind("snowplow", replacement);

        assert!(engine
            .invoke("snowplow", &[json!("trackPageView")])
            .is_none());
        assert!(calls.borrow().is_empty());
        assert_eq!(rx.try_recv().unwrap(), "blocked snowplow: trackPageView");

        assert!(engine
            .invoke("snowplow", &[json!("setUserId"), json!("anon")])
            .is_some());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_unruled_surface_passes_through() {
        let (mut engine, mut rx) = engine();
        let (surface, calls) = counting_call();
        engine.install("console_hook", surface);

        assert!(engine
            .invoke("console_hook", &[json!("anything")])
            .is_some());
        assert_eq!(calls.borrow().len(), 1);
        assert!(rx.try_recv().is_err());
    }
}
