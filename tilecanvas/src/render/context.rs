//! State shared by every render of one layer.

use std::fmt;
use std::future::Future;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};

use crate::pointer::{ClickEvent, FeatureClick, PickCycle, PickTicket, PointerState};
use crate::source::PickedFeature;

type SharedTask = Shared<BoxFuture<'static, Result<(), String>>>;

/// Result of one auxiliary task, captured rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSettled {
    Ready,
    Failed(String),
}

/// Deferred work every render waits on before layout, such as font loads.
///
/// Each task runs at most once; later renders observe its settled result.
#[derive(Default)]
pub struct AuxiliaryTasks {
    tasks: RwLock<Vec<(String, SharedTask)>>,
}

impl fmt::Debug for AuxiliaryTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.tasks.read().iter().map(|(n, _)| n.clone()).collect();
        f.debug_struct("AuxiliaryTasks").field("tasks", &names).finish()
    }
}

impl AuxiliaryTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. It is first polled by the next render that waits.
    pub fn register<F, E>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        let task = async move { task.await.map_err(|e| e.to_string()) }
            .boxed()
            .shared();
        self.tasks.write().push((name.into(), task));
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Wait for every registered task to settle, success or failure.
    pub async fn settle_all(&self) -> Vec<(String, TaskSettled)> {
        let tasks: Vec<(String, SharedTask)> = self.tasks.read().clone();
        let names: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();
        let results = join_all(tasks.into_iter().map(|(_, task)| task)).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let settled = match result {
                    Ok(()) => TaskSettled::Ready,
                    Err(e) => TaskSettled::Failed(e),
                };
                (name, settled)
            })
            .collect()
    }
}

/// Layer-wide render state: the last requested zoom, the pick cycle, and
/// auxiliary tasks.
///
/// Every in-flight render reads this; writes are short and never span an
/// await.
#[derive(Debug, Default)]
pub struct RenderContext {
    last_requested_zoom: Mutex<Option<u8>>,
    pick: Mutex<PickCycle>,
    tasks: AuxiliaryTasks,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_requested_zoom(&self, zoom: u8) {
        *self.last_requested_zoom.lock() = Some(zoom);
    }

    pub fn last_requested_zoom(&self) -> Option<u8> {
        *self.last_requested_zoom.lock()
    }

    pub fn tasks(&self) -> &AuxiliaryTasks {
        &self.tasks
    }

    /// Start a pick cycle. Returns the cycle id for [`resolve_pick`](Self::resolve_pick).
    pub fn arm_pick(&self, event: ClickEvent, pointer: PointerState) -> u64 {
        self.pick.lock().arm(event, pointer)
    }

    pub fn pick_ticket(&self) -> Option<PickTicket> {
        self.pick.lock().ticket()
    }

    pub fn record_picks(&self, cycle: u64, features: Vec<PickedFeature>) {
        self.pick.lock().record(cycle, features);
    }

    pub fn picked_count(&self) -> usize {
        self.pick.lock().picked_count()
    }

    /// Close pick cycle `cycle`, clearing the pointer.
    pub fn resolve_pick(&self, cycle: u64) -> Option<FeatureClick> {
        self.pick.lock().resolve(cycle)
    }
}
