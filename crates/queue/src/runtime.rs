//! Consuming side of the transport: worker pool, leases, retries, dead-letter.
//!
//! The runtime owns every scheduling decision. Handlers are pure functions
//! from task to [`Outcome`]; whatever they return, the runtime acknowledges,
//! reschedules with backoff, or dead-letters — handlers never loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use pipeline::Outcome;

use crate::task::{QueueKeys, Task};
use crate::TransportError;

/// How long one `BLMOVE` blocks before the loop re-checks for shutdown, and
/// how often housekeeping runs.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on the retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Moves due members of a zset (score <= now) onto a list, batch of 100.
/// KEYS[1] = zset, KEYS[2] = destination list, ARGV[1] = now.
const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 100)
for _, raw in ipairs(due) do
    redis.call('ZREM', KEYS[1], raw)
    redis.call('LPUSH', KEYS[2], raw)
end
return #due
";

/// Reclaims expired leases: each counts as a failed attempt, so the task is
/// redelivered immediately or dead-lettered once its budget is spent.
/// KEYS[1] = lease zset, KEYS[2] = active list, KEYS[3] = dead list,
/// KEYS[4] = pending list, ARGV[1] = now.
const REAP_LEASES_SCRIPT: &str = r"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 100)
for _, raw in ipairs(expired) do
    redis.call('ZREM', KEYS[1], raw)
    redis.call('LREM', KEYS[2], 1, raw)
    local ok, task = pcall(cjson.decode, raw)
    if not ok then
        redis.call('LPUSH', KEYS[3], raw)
    else
        task['retry_count'] = task['retry_count'] + 1
        if task['retry_count'] > task['max_retry'] then
            redis.call('LPUSH', KEYS[3], cjson.encode(task))
        else
            redis.call('LPUSH', KEYS[4], cjson.encode(task))
        end
    end
end
return #expired
";

/// Concludes one attempt in a single atomic step: the active/lease claim is
/// dropped and the scheduled or dead-letter entry written by the same script,
/// so a settling task is never absent from every key at once.
/// KEYS[1] = active list, KEYS[2] = lease zset, KEYS[3] = destination
/// (scheduled zset or dead list), ARGV[1] = raw member, ARGV[2] = mode
/// ('ack' | 'schedule' | 'dead'), ARGV[3] = retry-at score (schedule only),
/// ARGV[4] = re-encoded task (schedule only).
const SETTLE_SCRIPT: &str = r"
redis.call('LREM', KEYS[1], 1, ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
if ARGV[2] == 'schedule' then
    redis.call('ZADD', KEYS[3], ARGV[3], ARGV[4])
elseif ARGV[2] == 'dead' then
    redis.call('LPUSH', KEYS[3], ARGV[1])
end
return 1
";

/// Requeues active members that have no lease entry. Such members are
/// invisible to the lease reaper (a worker died or errored between the claim
/// and the lease record). A member caught mid-claim by this scan is
/// redelivered at worst, which at-least-once already permits.
/// KEYS[1] = active list, KEYS[2] = lease zset, KEYS[3] = pending list.
const REQUEUE_ORPHANS_SCRIPT: &str = r"
local active = redis.call('LRANGE', KEYS[1], 0, -1)
local moved = 0
for _, raw in ipairs(active) do
    if not redis.call('ZSCORE', KEYS[2], raw) then
        redis.call('LREM', KEYS[1], 1, raw)
        redis.call('LPUSH', KEYS[3], raw)
        moved = moved + 1
    end
end
return moved
";

/// Exponential backoff for the n-th redelivery: 15s, 30s, 60s, ... capped at
/// five minutes.
pub fn backoff_delay(retry_count: u32) -> Duration {
    let exp = retry_count.min(16);
    let secs = 15u64.saturating_mul(1u64 << exp);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// What the runtime does with a failed attempt.
#[derive(Debug, PartialEq, Eq)]
enum RetryStep {
    /// Schedule the (incremented) task this far in the future.
    Schedule(Duration),
    /// Budget spent; move to the dead-letter list.
    Dead,
}

fn next_step(task: &Task) -> RetryStep {
    if task.retries_exhausted() {
        RetryStep::Dead
    } else {
        RetryStep::Schedule(backoff_delay(task.retry_count))
    }
}

/// The queue move one finished attempt performs, decided up front so the
/// whole move runs as one [`SETTLE_SCRIPT`] call.
#[derive(Debug, PartialEq, Eq)]
enum SettlePlan {
    /// The task is done; only the claim is dropped.
    Ack,
    /// Drop the claim and schedule the re-encoded task for a later attempt.
    Schedule { task: Task, delay: Duration },
    /// Drop the claim and dead-letter the raw member.
    Dead,
}

fn plan_settle(task: &Task, outcome: &Outcome) -> SettlePlan {
    match outcome {
        Outcome::Success => SettlePlan::Ack,
        Outcome::Retry(_) | Outcome::Fatal(_) => match next_step(task) {
            RetryStep::Dead => SettlePlan::Dead,
            RetryStep::Schedule(delay) => {
                let mut retried = task.clone();
                retried.retry_count += 1;
                SettlePlan::Schedule {
                    task: retried,
                    delay,
                }
            }
        },
    }
}

fn failure_reason(outcome: &Outcome) -> &str {
    match outcome {
        Outcome::Success => "",
        Outcome::Retry(reason) | Outcome::Fatal(reason) => reason,
    }
}

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Maps one task to a terminal outcome. Implemented by
/// [`crate::WebhookProcessor`]; substituted in tests.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Processes one delivery attempt. Must not retry internally.
    async fn process(&self, task: &Task) -> Outcome;
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Tunables for one worker runtime.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to drain.
    pub queue: String,
    /// Number of concurrent worker loops.
    pub concurrency: usize,
}

impl WorkerConfig {
    /// Default configuration: the webhook queue, ten workers.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            concurrency: 10,
        }
    }
}

/// Drives a pool of worker loops plus one housekeeping loop until shutdown.
pub struct WorkerRuntime {
    conn: ConnectionManager,
    keys: QueueKeys,
    config: WorkerConfig,
}

impl WorkerRuntime {
    /// Creates a runtime over an established connection manager.
    pub fn new(conn: ConnectionManager, config: WorkerConfig) -> Self {
        Self {
            keys: QueueKeys::for_queue(&config.queue),
            conn,
            config,
        }
    }

    /// Runs until `shutdown` flips to `true`. In-flight tasks at shutdown are
    /// redelivered by lease reclamation once their deadline passes.
    pub async fn run(&self, handler: Arc<dyn TaskHandler>, shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.config.queue,
            concurrency = self.config.concurrency,
            "worker runtime starting"
        );

        let mut joins = Vec::new();
        for worker in 0..self.config.concurrency {
            let conn = self.conn.clone();
            let keys = self.keys.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker, conn, keys, handler, shutdown).await;
            }));
        }

        {
            let conn = self.conn.clone();
            let keys = self.keys.clone();
            let shutdown = shutdown.clone();
            joins.push(tokio::spawn(async move {
                housekeeping_loop(conn, keys, shutdown).await;
            }));
        }

        for join in joins {
            // A panicking worker is a bug; surface it instead of hanging the
            // remaining loops silently.
            if let Err(err) = join.await {
                error!(error = %err, "worker task panicked");
            }
        }

        info!(queue = %self.config.queue, "worker runtime stopped");
    }
}

async fn worker_loop(
    worker: usize,
    mut conn: ConnectionManager,
    keys: QueueKeys,
    handler: Arc<dyn TaskHandler>,
    shutdown: watch::Receiver<bool>,
) {
    let settle_script = redis::Script::new(SETTLE_SCRIPT);

    loop {
        if *shutdown.borrow() {
            debug!(worker, "worker loop stopping");
            return;
        }

        let fetched = fetch_one(&mut conn, &keys).await;
        let raw = match fetched {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(err) => {
                warn!(worker, error = %err, "fetch failed; backing off");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let task: Task = match serde_json::from_str(&raw) {
            Ok(task) => task,
            Err(err) => {
                // Not even a task record; nothing to retry. Release the
                // claim before dead-lettering so the reaper never sees it.
                error!(worker, error = %err, "undecodable queue member; dead-lettering");
                if let Err(err) = release_and_bury(&mut conn, &keys, &settle_script, &raw).await {
                    warn!(worker, error = %err, "failed to dead-letter undecodable member");
                }
                continue;
            }
        };

        let deadline = Duration::from_secs(task.timeout_secs);
        let outcome = match tokio::time::timeout(deadline, handler.process(&task)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Retry(format!("attempt exceeded {}s deadline", task.timeout_secs)),
        };

        if let Err(err) = settle(&mut conn, &keys, &settle_script, &raw, &task, outcome).await {
            // The lease reaper redelivers the task once its deadline passes.
            warn!(worker, task = %task.id, error = %err, "failed to settle attempt");
        }
    }
}

/// Atomically claims one task and records its lease deadline.
async fn fetch_one(
    conn: &mut ConnectionManager,
    keys: &QueueKeys,
) -> Result<Option<String>, TransportError> {
    let raw: Option<String> = redis::cmd("BLMOVE")
        .arg(&keys.pending)
        .arg(&keys.active)
        .arg("RIGHT")
        .arg("LEFT")
        .arg(POLL_INTERVAL.as_secs_f64())
        .query_async(conn)
        .await?;

    let Some(raw) = raw else {
        return Ok(None);
    };

    // The deadline is derived from the task's own timeout; fall back to the
    // default if the member is undecodable (the worker loop dead-letters it).
    let timeout_secs = serde_json::from_str::<Task>(&raw)
        .map(|t| t.timeout_secs)
        .unwrap_or(crate::task::DEFAULT_TIMEOUT_SECS);
    let deadline = Utc::now().timestamp() + timeout_secs as i64;

    let leased: Result<(), redis::RedisError> = conn.zadd(&keys.lease, &raw, deadline).await;
    if let Err(err) = leased {
        // A claim without a lease is invisible to the reaper; undo the claim
        // so the task goes back to pending instead of sitting in active. If
        // even the undo fails, the housekeeping orphan scan requeues it.
        let () = conn.lrem(&keys.active, 1, &raw).await?;
        let () = conn.lpush(&keys.pending, &raw).await?;
        return Err(err.into());
    }

    Ok(Some(raw))
}

/// Applies the outcome of one attempt: ack, reschedule, or dead-letter.
///
/// The claim drop and the destination write happen inside one
/// [`SETTLE_SCRIPT`] call, so a broker failure mid-settle leaves the task
/// either still claimed (the reaper redelivers it) or fully settled — never
/// gone.
async fn settle(
    conn: &mut ConnectionManager,
    keys: &QueueKeys,
    script: &redis::Script,
    raw: &str,
    task: &Task,
    outcome: Outcome,
) -> Result<(), TransportError> {
    if let Outcome::Fatal(reason) = &outcome {
        // The payload will never become valid, but the retry policy still
        // applies; the log line is what makes the dead-letter explicable.
        error!(task = %task.id, reason = %reason, "permanent failure");
    }

    match plan_settle(task, &outcome) {
        SettlePlan::Ack => {
            let _: i64 = script
                .key(&keys.active)
                .key(&keys.lease)
                .key(&keys.scheduled)
                .arg(raw)
                .arg("ack")
                .invoke_async(conn)
                .await?;
            debug!(task = %task.id, "task acknowledged");
            Ok(())
        }
        SettlePlan::Dead => {
            warn!(
                task = %task.id,
                retry_count = task.retry_count,
                reason = failure_reason(&outcome),
                "retries exhausted; dead-lettering"
            );
            let _: i64 = script
                .key(&keys.active)
                .key(&keys.lease)
                .key(&keys.dead)
                .arg(raw)
                .arg("dead")
                .invoke_async(conn)
                .await?;
            Ok(())
        }
        SettlePlan::Schedule {
            task: retried,
            delay,
        } => {
            let encoded = serde_json::to_string(&retried)?;
            let retry_at = Utc::now().timestamp() + delay.as_secs() as i64;

            let _: i64 = script
                .key(&keys.active)
                .key(&keys.lease)
                .key(&keys.scheduled)
                .arg(raw)
                .arg("schedule")
                .arg(retry_at)
                .arg(&encoded)
                .invoke_async(conn)
                .await?;
            info!(
                task = %task.id,
                retry_count = retried.retry_count,
                delay_secs = delay.as_secs(),
                reason = failure_reason(&outcome),
                "attempt failed; scheduled retry"
            );
            Ok(())
        }
    }
}

/// Drops a claimed member and dead-letters it in the same script call.
async fn release_and_bury(
    conn: &mut ConnectionManager,
    keys: &QueueKeys,
    script: &redis::Script,
    raw: &str,
) -> Result<(), TransportError> {
    let _: i64 = script
        .key(&keys.active)
        .key(&keys.lease)
        .key(&keys.dead)
        .arg(raw)
        .arg("dead")
        .invoke_async(conn)
        .await?;
    Ok(())
}

/// Promotes due retries and reclaims expired leases on a fixed cadence.
async fn housekeeping_loop(
    mut conn: ConnectionManager,
    keys: QueueKeys,
    shutdown: watch::Receiver<bool>,
) {
    let promote = redis::Script::new(PROMOTE_DUE_SCRIPT);
    let reap = redis::Script::new(REAP_LEASES_SCRIPT);
    let requeue = redis::Script::new(REQUEUE_ORPHANS_SCRIPT);

    loop {
        if *shutdown.borrow() {
            debug!("housekeeping loop stopping");
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;

        let now = Utc::now().timestamp();

        let promoted: Result<i64, _> = promote
            .key(&keys.scheduled)
            .key(&keys.pending)
            .arg(now)
            .invoke_async(&mut conn)
            .await;
        match promoted {
            Ok(n) if n > 0 => debug!(count = n, "promoted due retries"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to promote due retries"),
        }

        let reaped: Result<i64, _> = reap
            .key(&keys.lease)
            .key(&keys.active)
            .key(&keys.dead)
            .key(&keys.pending)
            .arg(now)
            .invoke_async(&mut conn)
            .await;
        match reaped {
            Ok(n) if n > 0 => warn!(count = n, "reclaimed expired leases"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to reclaim leases"),
        }

        let orphaned: Result<i64, _> = requeue
            .key(&keys.active)
            .key(&keys.lease)
            .key(&keys.pending)
            .invoke_async(&mut conn)
            .await;
        match orphaned {
            Ok(n) if n > 0 => warn!(count = n, "requeued leaseless active tasks"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to requeue leaseless tasks"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::WEBHOOK_TASK_TYPE;

    fn task_with_retries(retry_count: u32) -> Task {
        let mut task = Task::new(WEBHOOK_TASK_TYPE, Vec::new());
        task.retry_count = retry_count;
        task
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(15));
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(60));
        assert_eq!(backoff_delay(4), Duration::from_secs(240));
        assert_eq!(backoff_delay(5), MAX_BACKOFF);
        assert_eq!(backoff_delay(60), MAX_BACKOFF);
    }

    #[test]
    fn failed_attempts_schedule_until_the_budget_is_spent() {
        assert_eq!(
            next_step(&task_with_retries(0)),
            RetryStep::Schedule(Duration::from_secs(15))
        );
        assert_eq!(
            next_step(&task_with_retries(4)),
            RetryStep::Schedule(Duration::from_secs(240))
        );
        assert_eq!(next_step(&task_with_retries(5)), RetryStep::Dead);
        assert_eq!(next_step(&task_with_retries(9)), RetryStep::Dead);
    }

    #[test]
    fn success_plans_a_bare_ack() {
        assert_eq!(
            plan_settle(&task_with_retries(3), &Outcome::Success),
            SettlePlan::Ack
        );
    }

    #[test]
    fn failed_attempt_plans_a_schedule_with_one_more_retry() {
        let outcome = Outcome::Retry("broker hiccup".to_string());
        match plan_settle(&task_with_retries(1), &outcome) {
            SettlePlan::Schedule {
                task: retried,
                delay,
            } => {
                assert_eq!(retried.retry_count, 2);
                assert_eq!(delay, Duration::from_secs(30));
            }
            other => panic!("expected a schedule plan, got {other:?}"),
        }
    }

    #[test]
    fn fatal_outcomes_follow_the_same_retry_policy() {
        let outcome = Outcome::Fatal("bad payload".to_string());
        assert!(matches!(
            plan_settle(&task_with_retries(0), &outcome),
            SettlePlan::Schedule { .. }
        ));
        assert_eq!(plan_settle(&task_with_retries(5), &outcome), SettlePlan::Dead);
    }

    // -- broker round-trips (require a running Redis) -----------------------

    async fn test_conn() -> ConnectionManager {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        ConnectionManager::new(client).await.unwrap()
    }

    fn scratch_keys() -> QueueKeys {
        QueueKeys::for_queue(&format!("scratch-{}", pipeline::TaskId::new_random()))
    }

    async fn drop_queue(conn: &mut ConnectionManager, keys: &QueueKeys) {
        let () = conn
            .del(vec![
                keys.pending.clone(),
                keys.active.clone(),
                keys.lease.clone(),
                keys.scheduled.clone(),
                keys.dead.clone(),
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    async fn claiming_a_task_records_its_lease() {
        let mut conn = test_conn().await;
        let keys = scratch_keys();
        let raw = serde_json::to_string(&Task::new(WEBHOOK_TASK_TYPE, Vec::new())).unwrap();
        let () = conn.lpush(&keys.pending, &raw).await.unwrap();

        let claimed = fetch_one(&mut conn, &keys).await.unwrap().unwrap();
        assert_eq!(claimed, raw);

        let lease: Option<i64> = conn.zscore(&keys.lease, &raw).await.unwrap();
        assert!(lease.is_some());
        let active: Vec<String> = conn.lrange(&keys.active, 0, -1).await.unwrap();
        assert_eq!(active, vec![raw.clone()]);

        drop_queue(&mut conn, &keys).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    async fn settling_a_failed_attempt_moves_the_task_in_one_step() {
        let mut conn = test_conn().await;
        let keys = scratch_keys();
        let script = redis::Script::new(SETTLE_SCRIPT);

        let task = Task::new(WEBHOOK_TASK_TYPE, Vec::new());
        let raw = serde_json::to_string(&task).unwrap();
        let () = conn.lpush(&keys.active, &raw).await.unwrap();
        let () = conn.zadd(&keys.lease, &raw, 123).await.unwrap();

        settle(
            &mut conn,
            &keys,
            &script,
            &raw,
            &task,
            Outcome::Retry("flaky".to_string()),
        )
        .await
        .unwrap();

        let active: i64 = conn.llen(&keys.active).await.unwrap();
        let lease: i64 = conn.zcard(&keys.lease).await.unwrap();
        let scheduled: Vec<String> = conn.zrange(&keys.scheduled, 0, -1).await.unwrap();
        assert_eq!(active, 0);
        assert_eq!(lease, 0);
        assert_eq!(scheduled.len(), 1);
        let retried: Task = serde_json::from_str(&scheduled[0]).unwrap();
        assert_eq!(retried.retry_count, 1);

        drop_queue(&mut conn, &keys).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    async fn leaseless_active_members_are_requeued() {
        let mut conn = test_conn().await;
        let keys = scratch_keys();
        let raw = serde_json::to_string(&Task::new(WEBHOOK_TASK_TYPE, Vec::new())).unwrap();
        let () = conn.lpush(&keys.active, &raw).await.unwrap();

        let moved: i64 = redis::Script::new(REQUEUE_ORPHANS_SCRIPT)
            .key(&keys.active)
            .key(&keys.lease)
            .key(&keys.pending)
            .invoke_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let pending: Vec<String> = conn.lrange(&keys.pending, 0, -1).await.unwrap();
        assert_eq!(pending, vec![raw]);
        let active: i64 = conn.llen(&keys.active).await.unwrap();
        assert_eq!(active, 0);

        drop_queue(&mut conn, &keys).await;
    }
}
