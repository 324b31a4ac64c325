use serde::{Deserialize, Serialize};

use crate::graph::SceneGraph;

/// Where a system is allowed to run its side-effect-free work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadPolicy {
    #[default]
    Main,
    Pool,
}

/// Per-frame engine service driven by a [`Scheduler`].
pub trait System {
    fn name(&self) -> &str;

    /// One-time setup. Returning false keeps the system out of the frame loop.
    fn init(&mut self) -> bool {
        true
    }

    fn update(&mut self, graph: &mut SceneGraph, dt: f32);

    fn thread_policy(&self) -> ThreadPolicy {
        ThreadPolicy::Main
    }
}

/// Lets a caller keep ownership of a system it schedules.
impl<S: System + ?Sized> System for &mut S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn init(&mut self) -> bool {
        (**self).init()
    }

    fn update(&mut self, graph: &mut SceneGraph, dt: f32) {
        (**self).update(graph, dt)
    }

    fn thread_policy(&self) -> ThreadPolicy {
        (**self).thread_policy()
    }
}

/// Ordered list of systems ticked after the graph's own component update.
#[derive(Default)]
pub struct Scheduler<'a> {
    systems: Vec<Box<dyn System + 'a>>,
    ready: Vec<bool>,
}

impl<'a> Scheduler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise and register `system`. Returns whether it will be ticked.
    pub fn add(&mut self, mut system: Box<dyn System + 'a>) -> bool {
        let ok = system.init();
        if !ok {
            tracing::warn!(system = system.name(), "system failed to initialise");
        }
        self.systems.push(system);
        self.ready.push(ok);
        ok
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// One frame: components first, then every initialised system in
    /// registration order.
    pub fn tick(&mut self, graph: &mut SceneGraph, dt: f32) {
        let _span = tracing::debug_span!("tick", dt).entered();
        graph.update(dt);
        for (system, ready) in self.systems.iter_mut().zip(&self.ready) {
            if *ready {
                system.update(graph, dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::graph;
    use std::sync::{Arc, Mutex};

    struct Counter {
        name: &'static str,
        ok: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl System for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self) -> bool {
            self.ok
        }

        fn update(&mut self, _graph: &mut SceneGraph, _dt: f32) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn systems_tick_in_order_and_skip_failed_init() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for (name, ok) in [("a", true), ("broken", false), ("b", true)] {
            scheduler.add(Box::new(Counter {
                name,
                ok,
                log: log.clone(),
            }));
        }
        let mut g = graph();
        scheduler.tick(&mut g, 0.016);
        scheduler.tick(&mut g, 0.016);
        assert_eq!(*log.lock().unwrap(), ["a", "b", "a", "b"]);
        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn borrowed_system_stays_with_caller() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut counter = Counter {
            name: "borrowed",
            ok: true,
            log: log.clone(),
        };
        let mut g = graph();
        {
            let mut scheduler = Scheduler::new();
            assert!(scheduler.add(Box::new(&mut counter)));
            scheduler.tick(&mut g, 0.016);
        }
        assert_eq!(counter.name(), "borrowed");
        assert_eq!(*log.lock().unwrap(), ["borrowed"]);
    }

    #[test]
    fn policy_serializes_lowercase() {
        let json = serde_json::to_string(&ThreadPolicy::Pool).unwrap();
        assert_eq!(json, "\"pool\"");
    }
}
