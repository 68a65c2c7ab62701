// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


#![warn(missing_docs)]
#![deny(unsafe_code)]
//! # Scheduler 🕸️
//!
//! Owns every periodic and block-driven task of the relay client.
//!
//! Tasks are registered under a group (usually one per chain) so a whole
//! chain can be stopped at once. Each task runs on its own tokio task and
//! never overlaps itself; failures are logged and counted but never stop the
//! schedule.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;
use xrelay_types::CentralBlock;
use xrelay_utils::metric::Metrics;
use xrelay_utils::probe;

mod runner;

/// A predicate evaluated right before each invocation; `true` skips it.
pub type Skipper = Arc<dyn Fn() -> bool + Send + Sync>;

/// A closure returning the interval until the next invocation.
pub type IntervalFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// What makes a task run.
pub enum Trigger {
    /// Every `Duration`, starting right away.
    Interval(Duration),
    /// Like [`Trigger::Interval`], but the interval is re-evaluated after
    /// each invocation.
    Dynamic(IntervalFn),
    /// Once per new central-chain block.
    ///
    /// Blocks not higher than the last handled one are skipped; when several
    /// blocks are queued only the newest is handled.
    Blocks(broadcast::Receiver<CentralBlock>),
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Interval(d) => write!(f, "Interval({d:?})"),
            Trigger::Dynamic(_) => write!(f, "Dynamic"),
            Trigger::Blocks(_) => write!(f, "Blocks"),
        }
    }
}

/// How a task is registered.
#[derive(TypedBuilder)]
pub struct TaskOptions {
    /// Name of the task, unique within its group.
    #[builder(setter(into))]
    name: String,
    /// Group the task belongs to.
    #[builder(setter(into))]
    group: String,
    /// What makes the task run.
    trigger: Trigger,
    /// Optional predicate skipping invocations.
    #[builder(default, setter(strip_option))]
    skipper: Option<Skipper>,
}

/// Lifecycle of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the next trigger.
    Idle,
    /// An invocation is in progress.
    Running,
    /// The task was stopped and will never run again.
    Stopped,
}

/// Passed to every invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Name of the task.
    pub name: Arc<str>,
    /// Group of the task.
    pub group: Arc<str>,
    /// The block that triggered this invocation, for block tasks.
    pub block: Option<CentralBlock>,
    /// Cancelled when the task's group is stopped.
    pub cancel: CancellationToken,
}

/// A handle on a registered task.
#[derive(Debug)]
pub struct TaskHandle {
    state: Arc<Mutex<TaskState>>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// The current state of the task.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Waits until the task has stopped.
    pub async fn stopped(self) {
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "scheduled task panicked");
        }
    }
}

#[derive(Debug)]
struct Group {
    token: CancellationToken,
    tasks: HashMap<String, Arc<Mutex<TaskState>>>,
}

struct Inner {
    root: CancellationToken,
    groups: Mutex<HashMap<String, Group>>,
    metrics: Arc<tokio::sync::Mutex<Metrics>>,
}

/// The task scheduler. Cloning is cheap, every clone drives the same tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("groups", &self.groups())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler without any task.
    pub fn new(metrics: Arc<tokio::sync::Mutex<Metrics>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: CancellationToken::new(),
                groups: Mutex::new(HashMap::new()),
                metrics,
            }),
        }
    }

    /// Registers `task` and starts driving it.
    ///
    /// Must be called from within a tokio runtime. Fails if a task with the
    /// same name already runs in the group, or once the scheduler is
    /// stopped.
    pub fn register<F, Fut>(
        &self,
        opts: TaskOptions,
        task: F,
    ) -> xrelay_utils::Result<TaskHandle>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = xrelay_utils::Result<()>> + Send + 'static,
    {
        let TaskOptions {
            name,
            group,
            trigger,
            skipper,
        } = opts;
        let state = Arc::new(Mutex::new(TaskState::Idle));
        let token = {
            let mut groups = self.inner.groups.lock();
            if self.inner.root.is_cancelled() {
                return Err(xrelay_utils::Error::Cancelled);
            }
            let entry = groups.entry(group.clone()).or_insert_with(|| Group {
                token: self.inner.root.child_token(),
                tasks: HashMap::new(),
            });
            if entry.tasks.contains_key(&name) {
                tracing::warn!(%group, task = %name, "task is already registered");
                return Err(xrelay_utils::Error::Generic(
                    "task is already registered in this group",
                ));
            }
            entry.tasks.insert(name.clone(), state.clone());
            entry.token.clone()
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Scheduler,
            %group,
            task = %name,
            trigger = ?trigger,
            registered = true,
        );
        let runner = runner::Runner {
            name: Arc::from(name),
            group: Arc::from(group),
            skipper,
            task,
            token,
            state: state.clone(),
            metrics: self.inner.metrics.clone(),
        };
        let join = tokio::spawn(runner.run(trigger));
        Ok(TaskHandle { state, join })
    }

    /// Stops every task of `group`. Returns `false` if the group is unknown.
    ///
    /// In-flight invocations are dropped at their next suspension point.
    /// Work they spawned observes the cancellation through the token of
    /// their [`TaskContext`].
    pub fn stop_group(&self, group: &str) -> bool {
        let removed = self.inner.groups.lock().remove(group);
        match removed {
            Some(g) => {
                g.token.cancel();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Scheduler,
                    %group,
                    tasks = g.tasks.len(),
                    stopped = true,
                );
                true
            }
            None => false,
        }
    }

    /// Stops every task of every group.
    pub fn stop(&self) {
        self.inner.root.cancel();
        let groups = self
            .inner
            .groups
            .lock()
            .drain()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Scheduler,
            groups = ?groups,
            stopped = true,
        );
    }

    /// Names of the running groups.
    pub fn groups(&self) -> Vec<String> {
        let mut groups = self
            .inner
            .groups
            .lock()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        groups.sort();
        groups
    }

    /// Whether `group` has running tasks.
    pub fn has_group(&self, group: &str) -> bool {
        self.inner.groups.lock().contains_key(group)
    }

    /// The state of a running task.
    pub fn task_state(&self, group: &str, name: &str) -> Option<TaskState> {
        let groups = self.inner.groups.lock();
        let state = groups.get(group)?.tasks.get(name)?;
        let state = *state.lock();
        Some(state)
    }
}
