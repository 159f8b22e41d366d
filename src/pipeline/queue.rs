//! Generation Queue
//!
//! N個のワーカーが共有のFIFOチャネルからジョブを取り出して記事を生成する。
//! ジョブ開始数は governor のレートリミッターで1分あたりに制限する。

use super::orchestrator::{GenerationOutcome, GenerationRequest, PipelineOrchestrator};
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct GenerationJob {
    id: Uuid,
    request: GenerationRequest,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<GenerationOutcome>>,
}

/// 投入したジョブのハンドル
pub struct JobHandle {
    id: Uuid,
    cancel: CancellationToken,
    receiver: oneshot::Receiver<Result<GenerationOutcome>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// ジョブをキャンセル（実行中なら次のステージ境界で止まる）
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 結果を待つ
    pub async fn wait(self) -> Result<GenerationOutcome> {
        self.receiver
            .await
            .map_err(|_| Error::Internal(format!("job {} was dropped", self.id)))?
    }
}

/// 生成キュー
pub struct GenerationQueue {
    sender: mpsc::Sender<GenerationJob>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl GenerationQueue {
    /// ワーカーを起動
    pub fn start(orchestrator: Arc<PipelineOrchestrator>, config: &QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let per_minute = NonZeroU32::new(config.jobs_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter: Arc<DefaultDirectRateLimiter> =
            Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));
        let shutdown = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|index| {
                tokio::spawn(worker(
                    index,
                    Arc::clone(&orchestrator),
                    Arc::clone(&receiver),
                    Arc::clone(&limiter),
                    shutdown.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            "Generation queue started ({} worker(s), {} job(s)/min)",
            workers.len(),
            per_minute
        );

        Self {
            sender,
            shutdown,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// ジョブを投入
    pub async fn submit(&self, request: GenerationRequest) -> Result<JobHandle> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Internal("generation queue is shut down".to_string()));
        }

        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        let (reply, receiver) = oneshot::channel();
        debug!("Queueing job {} for \"{}\"", id, request.idea.title);

        self.sender
            .send(GenerationJob {
                id,
                request,
                cancel: cancel.clone(),
                reply,
            })
            .await
            .map_err(|_| Error::Internal("generation queue is shut down".to_string()))?;

        Ok(JobHandle {
            id,
            cancel,
            receiver,
        })
    }

    /// 停止する。実行中のジョブは次のステージ境界でキャンセルされる
    pub async fn shutdown(self) {
        info!("Shutting down generation queue");
        self.shutdown.cancel();
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!("Queue worker ended abnormally: {}", e);
            }
        }
    }
}

async fn worker(
    index: usize,
    orchestrator: Arc<PipelineOrchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<GenerationJob>>>,
    limiter: Arc<DefaultDirectRateLimiter>,
    shutdown: CancellationToken,
) {
    debug!("Queue worker {} started", index);
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        if job.cancel.is_cancelled() {
            debug!("Job {} cancelled while queued", job.id);
            let _ = job.reply.send(Err(Error::Cancelled {
                stage: "queued".to_string(),
            }));
            continue;
        }

        tokio::select! {
            _ = job.cancel.cancelled() => {
                let _ = job.reply.send(Err(Error::Cancelled {
                    stage: "queued".to_string(),
                }));
                continue;
            }
            _ = limiter.until_ready() => {}
        }

        info!("Worker {} processing job {}", index, job.id);
        let result = orchestrator.generate(&job.request, &job.cancel).await;
        if job.reply.send(result).is_err() {
            debug!("Job {} finished but its handle was dropped", job.id);
        }
    }
    debug!("Queue worker {} stopped", index);
}
