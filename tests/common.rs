use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use delivery_engine::{
    clients::{
        channel::{Channel, ChannelSet},
        memory::{MemoryNotificationStore, MemoryStatsStore},
        store::Stores,
    },
    engine::{DeliveryEngine, EngineConfig},
    error::ChannelError,
    models::{
        delivery::{ChannelKind, DeliveryResult},
        notification::{NotificationRequest, Priority},
    },
};
use tokio::{sync::Notify, time::Instant};

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: ChannelKind,
    pub request_id: String,
    pub recipient_id: String,
    pub priority: Priority,
    pub at: Instant,
}

/// Every attempt made by any scripted channel, in call order.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn for_request(&self, request_id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.request_id == request_id)
            .collect()
    }

    pub fn count(&self, kind: ChannelKind) -> usize {
        self.calls().iter().filter(|call| call.kind == kind).count()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub enum Script {
    Succeed,
    Fail,
    Panic,
}

/// Channel that plays back scripted outcomes, then falls back to `default`.
pub struct ScriptedChannel {
    kind: ChannelKind,
    script: Mutex<VecDeque<Script>>,
    default_ok: bool,
    log: CallLog,
}

impl ScriptedChannel {
    pub fn succeeding(kind: ChannelKind, log: &CallLog) -> Self {
        Self::new(kind, true, log)
    }

    pub fn failing(kind: ChannelKind, log: &CallLog) -> Self {
        Self::new(kind, false, log)
    }

    fn new(kind: ChannelKind, default_ok: bool, log: &CallLog) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            default_ok,
            log: log.clone(),
        }
    }

    pub fn then(self, steps: impl IntoIterator<Item = Script>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        self.log.push(Call {
            kind: self.kind,
            request_id: request.id.clone(),
            recipient_id: request.recipient_id.clone(),
            priority: request.priority,
            at: Instant::now(),
        });

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Script::Succeed) => Ok(()),
            Some(Script::Fail) => Err(ChannelError::transport(format!("{} unavailable", self.kind))),
            Some(Script::Panic) => panic!("{} driver crashed", self.kind),
            None if self.default_ok => Ok(()),
            None => Err(ChannelError::transport(format!("{} unavailable", self.kind))),
        }
    }
}

/// Channel whose first `open_calls` attempts fail at once. Later attempts
/// block until `release` is called, then succeed.
pub struct GatedChannel {
    kind: ChannelKind,
    open_calls: usize,
    calls: AtomicUsize,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    log: CallLog,
}

/// Handle kept by the test while the channel is owned by the engine.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl Gate {
    /// Resolves once an attempt is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

impl GatedChannel {
    pub fn new(kind: ChannelKind, open_calls: usize, log: &CallLog) -> (Self, Gate) {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let channel = Self {
            kind,
            open_calls,
            calls: AtomicUsize::new(0),
            entered: Arc::clone(&entered),
            gate: Arc::clone(&gate),
            log: log.clone(),
        };
        (channel, Gate { entered, gate })
    }
}

#[async_trait]
impl Channel for GatedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn attempt(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        self.log.push(Call {
            kind: self.kind,
            request_id: request.id.clone(),
            recipient_id: request.recipient_id.clone(),
            priority: request.priority,
            at: Instant::now(),
        });

        if self.calls.fetch_add(1, Ordering::SeqCst) < self.open_calls {
            return Err(ChannelError::transport(format!("{} unavailable", self.kind)));
        }

        self.entered.notify_one();
        self.gate.notified().await;
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<DeliveryEngine>,
    pub stats: Arc<MemoryStatsStore>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub log: CallLog,
}

impl Harness {
    pub fn new(
        log: CallLog,
        push: impl Channel + 'static,
        realtime: impl Channel + 'static,
        sms: impl Channel + 'static,
    ) -> Self {
        Self::with_config(log, push, realtime, sms, EngineConfig::default())
    }

    pub fn with_config(
        log: CallLog,
        push: impl Channel + 'static,
        realtime: impl Channel + 'static,
        sms: impl Channel + 'static,
        config: EngineConfig,
    ) -> Self {
        let stats = Arc::new(MemoryStatsStore::new());
        let notifications = Arc::new(MemoryNotificationStore::new());

        let engine = DeliveryEngine::new(
            ChannelSet::new(Arc::new(push), Arc::new(realtime), Arc::new(sms)),
            Stores::new(stats.clone(), notifications.clone()),
            config,
        );

        Self {
            engine: Arc::new(engine),
            stats,
            notifications,
            log,
        }
    }

    /// Every channel fails on every attempt.
    pub fn all_failing() -> Self {
        let log = CallLog::default();
        Self::new(
            log.clone(),
            ScriptedChannel::failing(ChannelKind::Push, &log),
            ScriptedChannel::failing(ChannelKind::Realtime, &log),
            ScriptedChannel::failing(ChannelKind::Sms, &log),
        )
    }

    /// Polls the stats store until the request has a terminal result. Meant
    /// for paused-clock tests, where the sleeps auto-advance.
    pub async fn wait_for_result(&self, request_id: &str) -> DeliveryResult {
        for _ in 0..1_000 {
            if let Some(result) = self.stats.result_for(request_id) {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        panic!("no terminal result recorded for {}", request_id);
    }

    pub fn attempt_numbers(&self, request_id: &str) -> Vec<u32> {
        self.stats
            .attempts_for(request_id)
            .iter()
            .map(|attempt| attempt.attempt_number)
            .collect()
    }
}

pub fn assert_elapsed(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(5);
    assert!(
        actual >= expected && actual <= expected + tolerance,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}
