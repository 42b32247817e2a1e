//! Typed handler registrations per event kind.

use crate::clock::Millis;
use crate::event::{EventKind, LinkEvent};
use crate::timer::{Timers, Wake};
use std::collections::HashMap;
use std::sync::Arc;

/// What a handler sees while it runs: the current time and the timer queue.
pub struct Context<'a> {
    now: Millis,
    timers: &'a mut Timers,
}

impl<'a> Context<'a> {
    pub fn new(now: Millis, timers: &'a mut Timers) -> Self {
        Self { now, timers }
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    /// Re-invokes the wake handler `delay` ms from now.
    pub fn schedule_in(&mut self, delay: Millis, wake: Wake) {
        self.timers.schedule(self.now.saturating_add(delay), wake);
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &LinkEvent, cx: &mut Context<'_>);
}

impl<F> EventHandler for F
where
    F: Fn(&LinkEvent, &mut Context<'_>) + Send + Sync,
{
    fn handle(&self, event: &LinkEvent, cx: &mut Context<'_>) {
        self(event, cx)
    }
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, kind: EventKind, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Runs every handler registered for the event's kind, in registration order.
    pub fn dispatch(&self, event: &LinkEvent, cx: &mut Context<'_>) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            log::trace!("no handler for {event:?}");
            return 0;
        };
        for handler in handlers {
            handler.handle(event, cx);
        }
        handlers.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (kind, handlers) in &self.handlers {
            map.entry(kind, &handlers.len());
        }
        map.finish()
    }
}
