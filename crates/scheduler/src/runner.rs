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


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_util::sync::CancellationToken;
use xrelay_types::CentralBlock;
use xrelay_utils::metric::Metrics;
use xrelay_utils::probe;

use crate::{IntervalFn, Skipper, TaskContext, TaskState, Trigger};

/// Drives one registered task until its token is cancelled.
pub(crate) struct Runner<F> {
    pub name: Arc<str>,
    pub group: Arc<str>,
    pub skipper: Option<Skipper>,
    pub task: F,
    pub token: CancellationToken,
    pub state: Arc<Mutex<TaskState>>,
    pub metrics: Arc<tokio::sync::Mutex<Metrics>>,
}

impl<F, Fut> Runner<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = xrelay_utils::Result<()>> + Send + 'static,
{
    pub async fn run(self, trigger: Trigger) {
        match trigger {
            Trigger::Interval(every) => {
                self.run_ticker(Arc::new(move || every)).await
            }
            Trigger::Dynamic(interval) => self.run_ticker(interval).await,
            Trigger::Blocks(blocks) => self.run_blocks(blocks).await,
        }
        *self.state.lock() = TaskState::Stopped;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Scheduler,
            group = %self.group,
            task = %self.name,
            stopped = true,
        );
    }

    async fn run_ticker(&self, interval: IntervalFn) {
        loop {
            self.invoke(None).await;
            let next = interval();
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(next) => {}
            }
        }
    }

    async fn run_blocks(&self, mut blocks: broadcast::Receiver<CentralBlock>) {
        let mut last_height: Option<u64> = None;
        loop {
            let received = tokio::select! {
                _ = self.token.cancelled() => return,
                received = blocks.recv() => received,
            };
            let mut block = match received {
                Ok(block) => block,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        group = %self.group,
                        task = %self.name,
                        skipped,
                        "block stream lagged"
                    );
                    continue;
                }
                Err(RecvError::Closed) => {
                    tracing::warn!(
                        group = %self.group,
                        task = %self.name,
                        "block stream closed, stopping task"
                    );
                    return;
                }
            };
            // only the newest queued block is worth handling.
            loop {
                match blocks.try_recv() {
                    Ok(newer) => block = newer,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            if last_height.map_or(false, |last| block.height <= last) {
                tracing::trace!(
                    group = %self.group,
                    task = %self.name,
                    height = block.height,
                    "skipping stale block"
                );
                continue;
            }
            last_height = Some(block.height);
            self.invoke(Some(block)).await;
        }
    }

    async fn invoke(&self, block: Option<CentralBlock>) {
        if self.token.is_cancelled() {
            return;
        }
        if let Some(skip) = &self.skipper {
            if skip() {
                tracing::trace!(
                    group = %self.group,
                    task = %self.name,
                    "invocation skipped"
                );
                return;
            }
        }
        *self.state.lock() = TaskState::Running;
        let ctx = TaskContext {
            name: self.name.clone(),
            group: self.group.clone(),
            block,
            cancel: self.token.clone(),
        };
        // in-flight calls are dropped as soon as the group is stopped.
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(xrelay_utils::Error::Cancelled),
            result = (self.task)(ctx) => result,
        };
        *self.state.lock() = TaskState::Idle;
        if let Err(xrelay_utils::Error::Cancelled) = result {
            tracing::debug!(
                group = %self.group,
                task = %self.name,
                "invocation cancelled"
            );
        } else if let Err(e) = result {
            self.metrics.lock().await.scheduler_task_failures.inc();
            tracing::error!(
                group = %self.group,
                task = %self.name,
                error = %e,
                "scheduled task failed"
            );
        }
    }
}
