// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use codec::v3::PublishPacket;
use codec::QoS;

use crate::error::{Error, ErrorKind};

/// Message handler registered by the application.
///
/// Invoked with the topic name, the `QoS` the message arrived with and the
/// payload bytes. Handlers are called synchronously from the session loop;
/// a handler which might block should hand its work to its own task.
pub type SubHandler = Arc<dyn Fn(&str, QoS, &[u8]) + Send + Sync>;

/// Maps incoming publish topics to user handlers.
///
/// The broker applies topic filter wildcards; a router only decides which
/// handler inside the client receives the already filtered topic.
pub trait TopicRouter: Send + Sync {
    /// Name of the routing strategy, for logs.
    fn name(&self) -> &str;

    /// Register `handler` under `topic`.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid key for this strategy.
    fn handle(&self, topic: &str, handler: SubHandler) -> Result<(), Error>;

    /// Drop the registration made under `topic`.
    fn remove(&self, topic: &str);

    /// Deliver `packet` to interested handlers. Returns the number of
    /// handlers invoked.
    fn dispatch(&self, packet: &PublishPacket) -> usize;
}

/// Exact-match router; the default strategy.
///
/// Keys are topic strings, lookup is a single map access, and registering
/// an existing key replaces the previous handler.
#[derive(Default)]
pub struct TextRouter {
    handlers: Mutex<HashMap<String, SubHandler>>,
}

impl TextRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TopicRouter for TextRouter {
    fn name(&self) -> &str {
        "TextRouter"
    }

    fn handle(&self, topic: &str, handler: SubHandler) -> Result<(), Error> {
        self.handlers
            .lock()
            .unwrap()
            .insert(topic.to_string(), handler);
        Ok(())
    }

    fn remove(&self, topic: &str) {
        self.handlers.lock().unwrap().remove(topic);
    }

    fn dispatch(&self, packet: &PublishPacket) -> usize {
        let handler = self.handlers.lock().unwrap().get(packet.topic()).cloned();
        if let Some(handler) = handler {
            handler(packet.topic(), packet.qos(), packet.message());
            1
        } else {
            log::debug!("router: No handler for topic {}", packet.topic());
            0
        }
    }
}

/// Regex router.
///
/// Keys are compiled regular expressions; dispatch walks the registrations
/// in order and invokes every handler whose pattern matches the topic.
#[derive(Default)]
pub struct RegexRouter {
    handlers: Mutex<Vec<(Regex, SubHandler)>>,
}

impl RegexRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TopicRouter for RegexRouter {
    fn name(&self) -> &str {
        "RegexRouter"
    }

    fn handle(&self, topic: &str, handler: SubHandler) -> Result<(), Error> {
        let pattern = Regex::new(topic).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid topic regex {topic}, {err}"),
            )
        })?;
        self.handlers.lock().unwrap().push((pattern, handler));
        Ok(())
    }

    fn remove(&self, topic: &str) {
        self.handlers
            .lock()
            .unwrap()
            .retain(|(pattern, _handler)| pattern.as_str() != topic);
    }

    fn dispatch(&self, packet: &PublishPacket) -> usize {
        let matched: Vec<SubHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(pattern, _handler)| pattern.is_match(packet.topic()))
            .map(|(_pattern, handler)| Arc::clone(handler))
            .collect();

        for handler in &matched {
            handler(packet.topic(), packet.qos(), packet.message());
        }
        matched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> SubHandler {
        Arc::new(move |_topic, _qos, _payload| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn publish(topic: &str) -> PublishPacket {
        PublishPacket::new(topic, QoS::AtMostOnce, b"payload").unwrap()
    }

    #[test]
    fn test_text_router_exact_match() {
        let router = TextRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router
            .handle("t/a", counting_handler(Arc::clone(&counter)))
            .unwrap();

        assert_eq!(router.dispatch(&publish("t/a")), 1);
        assert_eq!(router.dispatch(&publish("t/b")), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_router_replace() {
        let router = TextRouter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        router
            .handle("t/a", counting_handler(Arc::clone(&first)))
            .unwrap();
        router
            .handle("t/a", counting_handler(Arc::clone(&second)))
            .unwrap();

        router.dispatch(&publish("t/a"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_router_remove() {
        let router = TextRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router
            .handle("t/a", counting_handler(Arc::clone(&counter)))
            .unwrap();
        router.remove("t/a");
        assert_eq!(router.dispatch(&publish("t/a")), 0);
    }

    #[test]
    fn test_regex_router_dispatches_all_matches() {
        let router = RegexRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router
            .handle("^t/.*", counting_handler(Arc::clone(&counter)))
            .unwrap();
        router
            .handle("^t/a$", counting_handler(Arc::clone(&counter)))
            .unwrap();

        assert_eq!(router.dispatch(&publish("t/a")), 2);
        assert_eq!(router.dispatch(&publish("t/b")), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_regex_router_order() {
        let router = RegexRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            let handler: SubHandler = Arc::new(move |_topic, _qos, _payload| {
                order.lock().unwrap().push(tag);
            });
            router.handle("^t/a$", handler).unwrap();
        }

        router.dispatch(&publish("t/a"));
        assert_eq!(*order.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn test_regex_router_rejects_bad_pattern() {
        let router = RegexRouter::new();
        let handler: SubHandler = Arc::new(|_topic, _qos, _payload| {});
        let err = router.handle("t/(", handler).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
