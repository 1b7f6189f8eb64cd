use foundation::SessionKey;

/// One entry of the lifecycle trace.
///
/// `kind` is a short stable tag (`"transition"`, `"stale"`, ...) so tests and
/// tooling can filter without parsing `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub seq: u64,
    pub session: SessionKey,
    pub kind: &'static str,
    pub message: String,
}

/// Ordered, in-memory event log.
#[derive(Debug, Default)]
pub struct EventBus {
    next_seq: u64,
    events: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, session: SessionKey, kind: &'static str, message: impl Into<String>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            seq,
            session,
            kind,
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Messages of every event with the given kind, oldest first.
    pub fn messages_of(&self, kind: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
