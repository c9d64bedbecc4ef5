//! Host-scoped notifications for breaker state transitions
//!
//! Transitions happen under the breaker's lock, listeners must not. A breaker
//! queues each [`Notification`] while it transitions and hands the queue out
//! as [`Pending`], which the caller fires once the lock is released. Listeners
//! are therefore free to read the registry or open new connections.

use std::sync::Arc;

/// Shared host-scoped listener
pub type HostCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Transition a breaker reports to its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Open,
    Close,
    HalfOpen,
}

/// Listeners for breaker transitions, each receiving the host
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<HostCallback>,
    pub on_close: Option<HostCallback>,
    pub on_half_open: Option<HostCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    fn listener(&self, notification: Notification) -> Option<&HostCallback> {
        match notification {
            Notification::Open => self.on_open.as_ref(),
            Notification::Close => self.on_close.as_ref(),
            Notification::HalfOpen => self.on_half_open.as_ref(),
        }
    }

    /// Invoke the listener for `notification`, if any
    pub fn trigger(&self, notification: Notification, host: &str) {
        if let Some(callback) = self.listener(notification) {
            callback(host);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

/// Notifications taken from a breaker, to be fired after its lock is dropped
#[must_use = "notifications are lost unless fired"]
#[derive(Debug)]
pub struct Pending {
    host: String,
    callbacks: Callbacks,
    notifications: Vec<Notification>,
}

impl Pending {
    pub(crate) fn new(host: &str, callbacks: &Callbacks, notifications: Vec<Notification>) -> Self {
        Self {
            host: host.to_string(),
            callbacks: callbacks.clone(),
            notifications,
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Deliver queued notifications in the order the transitions happened
    pub fn fire(self) {
        for notification in self.notifications {
            self.callbacks.trigger(notification, &self.host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Callbacks, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (open, close) = (seen.clone(), seen.clone());

        let callbacks = Callbacks {
            on_open: Some(Arc::new(move |host: &str| {
                open.lock().unwrap().push(format!("open:{host}"));
            })),
            on_close: Some(Arc::new(move |host: &str| {
                close.lock().unwrap().push(format!("close:{host}"));
            })),
            ..Default::default()
        };

        (callbacks, seen)
    }

    #[test]
    fn test_empty_callbacks_are_noops() {
        let callbacks = Callbacks::new();
        callbacks.trigger(Notification::Open, "a");
        callbacks.trigger(Notification::Close, "a");
        callbacks.trigger(Notification::HalfOpen, "a");
    }

    #[test]
    fn test_trigger_routes_by_notification() {
        let (callbacks, seen) = recording();

        callbacks.trigger(Notification::Open, "db.internal");
        callbacks.trigger(Notification::HalfOpen, "db.internal");
        callbacks.trigger(Notification::Close, "db.internal");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["open:db.internal".to_string(), "close:db.internal".to_string()]
        );
    }

    #[test]
    fn test_pending_fires_in_order_and_only_when_asked() {
        let (callbacks, seen) = recording();

        let pending = Pending::new(
            "api",
            &callbacks,
            vec![Notification::Close, Notification::Open],
        );
        assert_eq!(pending.notifications(), &[Notification::Close, Notification::Open]);
        assert!(seen.lock().unwrap().is_empty());

        pending.fire();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["close:api".to_string(), "open:api".to_string()]
        );
    }

    #[test]
    fn test_empty_pending() {
        let pending = Pending::new("api", &Callbacks::new(), Vec::new());
        assert!(pending.is_empty());
        pending.fire();
    }
}
