use std::sync::Arc;

use chrono::Utc;

use crate::correlator::RequestMap;
use crate::message::{MessageKind, Origin, RawMessage, Trace};

/// Turns decoded envelopes from one direction into trace records.
///
/// Requests register their method with the shared [`RequestMap`]; responses
/// and errors recover it from there, so a response trace carries the name
/// of the request it answers.
pub struct Tracer {
    from: Origin,
    requests: Arc<RequestMap>,
}

impl Tracer {
    pub fn new(from: Origin, requests: Arc<RequestMap>) -> Self {
        Self { from, requests }
    }

    pub fn origin(&self) -> Origin {
        self.from
    }

    pub fn trace(&self, msg: RawMessage) -> Trace {
        let kind = msg.kind();
        let mut trace = Trace {
            kind,
            from: self.from,
            method: msg.method.clone(),
            id: msg.id,
            timestamp: Utc::now(),
            msg,
        };
        match kind {
            MessageKind::Request => {
                if let (Some(id), Some(method)) = (trace.id, trace.msg.method.as_deref()) {
                    self.requests.insert(id, method);
                }
            }
            MessageKind::Response | MessageKind::Error => {
                if let Some(id) = trace.id {
                    trace.method = Some(self.requests.pop(id));
                }
            }
            MessageKind::Notification | MessageKind::Unknown => {}
        }
        trace
    }
}
