#![allow(unused)]

use crate::task::Id;
use std::time::Duration;

#[cfg(test)]
use dashmap::DashMap;
#[cfg(test)]
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Call,
    CallAfter,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Call { id: Id },
    CallAfter { id: Id, delay: Duration },
    Run { id: Id, tick: u64 },
}

#[cfg(test)]
/// Records every scheduling decision a [`Loop`](crate::runtime::Loop) makes so
/// tests can assert on ordering without instrumenting the handles.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

#[cfg(test)]
impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Call, Vec::new());
        map.insert(Method::CallAfter, Vec::new());
        map.insert(Method::Run, Vec::new());

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }

    /// Ids of the handles that ran, in order.
    pub(crate) fn run_order(&self) -> Vec<Id> {
        self.get_calls(&Method::Run)
            .into_iter()
            .filter_map(|call| match call {
                Call::Run { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}
