//! Integration tests for rate limiting, run on tokio's paused clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use coda_exporter::concurrency::{CallStack, ConcurrencyGate, Phase, RateLimiter, RetryPolicy};
use coda_exporter::{Error, Result};

/// Fake remote endpoint that refuses every call until `limited_until`
struct LimitedService {
    start: Instant,
    limited_until: Duration,
    latency: Duration,
    invocations: Mutex<Vec<(Duration, Phase)>>,
}

impl LimitedService {
    fn new(limited_until: Duration, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            limited_until,
            latency,
            invocations: Mutex::new(Vec::new()),
        })
    }

    /// `phase` is the limiter phase the call was admitted in
    async fn call(&self, phase: Phase) -> Result<Duration> {
        let at = self.start.elapsed();
        self.invocations.lock().unwrap().push((at, phase));
        tokio::time::sleep(self.latency).await;
        if self.start.elapsed() <= self.limited_until {
            Err(Error::RateLimited("Status code: 429".into()))
        } else {
            Ok(at)
        }
    }

    fn invocations(&self) -> Vec<(Duration, Phase)> {
        self.invocations.lock().unwrap().clone()
    }
}

fn spawn_call(
    limiter: &Arc<RateLimiter>,
    service: &Arc<LimitedService>,
) -> tokio::task::JoinHandle<Result<Duration>> {
    let (limiter, service) = (limiter.clone(), service.clone());
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        limiter
            .run(&cancel, || service.call(limiter.phase()))
            .await
    })
}

#[tokio::test(start_paused = true)]
async fn test_ten_second_backoff_timeline() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    // Refuses only the call made at t=0.
    let service = LimitedService::new(Duration::ZERO, Duration::ZERO);

    let first = spawn_call(&limiter, &service);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.phase(), Phase::Backoff);

    let mut pending = vec![first];
    for _ in 0..3 {
        pending.push(spawn_call(&limiter, &service));
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    // t=7: still nobody but the first call reached the service.
    assert_eq!(service.invocations().len(), 1);

    tokio::time::sleep_until(service.start + Duration::from_millis(10_500)).await;
    let late = spawn_call(&limiter, &service);

    for handle in pending {
        handle.await.unwrap().unwrap();
    }
    let late_at = late.await.unwrap().unwrap();

    let times = service.invocations();
    assert_eq!(times[0], (Duration::ZERO, Phase::Normal));
    let probes: Vec<_> = times.iter().filter(|(_, phase)| *phase == Phase::Recovering).collect();
    assert_eq!(probes.len(), 1, "exactly one probe: {times:?}");
    assert!(probes[0].0 >= Duration::from_secs(10) && probes[0].0 < Duration::from_millis(10_100));
    assert!(times[1..].iter().all(|(at, _)| *at >= Duration::from_secs(10)));
    assert!(late_at >= Duration::from_millis(10_500) && late_at < Duration::from_millis(10_600));
    assert_eq!(limiter.phase(), Phase::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_single_probe_at_a_time() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(5)));
    let service = LimitedService::new(Duration::from_secs(25), Duration::from_millis(300));
    let in_probe = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let (limiter, service) = (limiter.clone(), service.clone());
            let (in_probe, peak) = (in_probe.clone(), peak.clone());
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                let (limiter_ref, service) = (&*limiter, &*service);
                let (in_probe, peak) = (&*in_probe, &*peak);
                limiter
                    .run(&cancel, move || {
                        let phase = limiter_ref.phase();
                        async move {
                            let probing = phase == Phase::Recovering;
                            if probing {
                                let now = in_probe.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                            }
                            let result = service.call(phase).await;
                            if probing {
                                in_probe.fetch_sub(1, Ordering::SeqCst);
                            }
                            result
                        }
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);

    // Several windows elapsed before the service recovered, one probe each.
    let probes = service
        .invocations()
        .iter()
        .filter(|(_, phase)| *phase == Phase::Recovering)
        .count();
    assert!(probes >= 4, "expected repeated probes, got {probes}");
}

#[tokio::test(start_paused = true)]
async fn test_backoff_until_never_decreases() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3)));
    let service = LimitedService::new(Duration::from_secs(12), Duration::from_millis(200));

    let handles: Vec<_> = (0..8).map(|_| spawn_call(&limiter, &service)).collect();

    let mut last = None;
    let mut samples = 0;
    while !handles.iter().all(|h| h.is_finished()) {
        if let Some(until) = limiter.backoff_until() {
            if let Some(previous) = last {
                assert!(until >= previous, "backoff_until moved backwards");
            }
            last = Some(until);
            samples += 1;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(samples > 0);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_many_callers_all_recover() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    let failed_once = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let (limiter, failed_once) = (limiter.clone(), failed_once.clone());
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                limiter
                    .run(&cancel, || async {
                        if failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(Error::RateLimited("Status code: 429".into()))
                        } else {
                            Ok(i)
                        }
                    })
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(results, (0..50).collect::<Vec<_>>());
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(limiter.phase(), Phase::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_calls_can_exhaust_the_gate() {
    let gate = ConcurrencyGate::new(2);
    let limited = CallStack::new(
        gate.clone(),
        RetryPolicy::new(0),
        Arc::new(RateLimiter::new(Duration::from_secs(10))),
    );
    // Shares the gate but not the limiter.
    let unrelated = CallStack::new(
        gate.clone(),
        RetryPolicy::new(0),
        Arc::new(RateLimiter::new(Duration::from_secs(10))),
    );
    let service = LimitedService::new(Duration::ZERO, Duration::ZERO);
    let start = Instant::now();

    let waiting: Vec<_> = (0..2)
        .map(|_| {
            let (stack, service) = (limited.clone(), service.clone());
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                stack.call(&cancel, || service.call(Phase::Normal)).await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gate.available(), 0);

    let cancel = CancellationToken::new();
    unrelated.call(&cancel, || async { Ok(()) }).await.unwrap();
    // The unrelated call only got a slot once a rate-limited call finished.
    assert!(start.elapsed() >= Duration::from_secs(10));

    for handle in waiting {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(gate.available(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_releases_waiting_callers() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3600)));
    let service = LimitedService::new(Duration::from_secs(7200), Duration::ZERO);
    let cancel = CancellationToken::new();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let (limiter, service, cancel) = (limiter.clone(), service.clone(), cancel.clone());
            tokio::spawn(async move {
                limiter
                    .run(&cancel, || service.call(Phase::Normal))
                    .await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(60)).await;
    cancel.cancel();

    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Err(Error::Cancelled)));
    }
    assert_eq!(limiter.phase(), Phase::Backoff);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_hands_recovery_to_another_caller() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    let start = Instant::now();
    // (caller, admitted phase, elapsed) per invocation
    let log: Arc<Mutex<Vec<(usize, Phase, Duration)>>> = Arc::default();

    let spawn_caller = |caller: usize| {
        let (limiter, log) = (limiter.clone(), log.clone());
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            limiter
                .run(&cancel, || {
                    let invocation = {
                        let mut log = log.lock().unwrap();
                        log.push((caller, limiter.phase(), start.elapsed()));
                        log.len() - 1
                    };
                    async move {
                        match invocation {
                            0 => Err(Error::RateLimited("Status code: 429".into())),
                            1 => Err(Error::Network("connection reset".into())),
                            _ => Ok(caller),
                        }
                    }
                })
                .await
        })
    };

    let first = spawn_caller(0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.phase(), Phase::Backoff);
    let handles = vec![first, spawn_caller(1), spawn_caller(2)];

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let log = log.lock().unwrap().clone();
    assert_eq!(log[0], (0, Phase::Normal, Duration::ZERO));
    let probes: Vec<_> = log.iter().filter(|(_, phase, _)| *phase == Phase::Recovering).collect();
    assert_eq!(probes.len(), 2, "{log:?}");
    let (failed_caller, _, failed_at) = *probes[0];
    let (next_caller, _, next_at) = *probes[1];
    assert!(failed_at >= Duration::from_secs(10));
    assert_ne!(next_caller, failed_caller, "{log:?}");
    assert!(next_at >= failed_at + Duration::from_secs(1));

    // Only the failed probe sees its error; everyone else succeeds.
    for (caller, result) in results.iter().enumerate() {
        if caller == failed_caller {
            assert!(matches!(result, Err(Error::Network(_))));
        } else {
            assert_eq!(result.as_ref().unwrap(), &caller);
        }
    }
    assert_eq!(limiter.phase(), Phase::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_while_recovering_leaves_state_alone() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
    let start = Instant::now();

    // Admitted at t=0, refused at t=12 while the probe is still out.
    let straggler = {
        let limiter = limiter.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            limiter
                .run(&cancel, || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            tokio::time::sleep(Duration::from_secs(12)).await;
                            Err(Error::RateLimited("Status code: 429".into()))
                        } else {
                            Ok("straggler")
                        }
                    }
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Refused right away, then probes from t=10 to t=15.
    let prober = {
        let limiter = limiter.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            limiter
                .run(&cancel, || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(Error::RateLimited("Status code: 429".into()))
                        } else {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            Ok("prober")
                        }
                    }
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.phase(), Phase::Backoff);
    let until = limiter.backoff_until();

    tokio::time::sleep_until(start + Duration::from_millis(12_500)).await;
    assert_eq!(limiter.phase(), Phase::Recovering);
    assert_eq!(limiter.backoff_until(), until);

    assert_eq!(prober.await.unwrap().unwrap(), "prober");
    assert_eq!(straggler.await.unwrap().unwrap(), "straggler");
    assert!(start.elapsed() >= Duration::from_secs(15));
    assert_eq!(limiter.phase(), Phase::Normal);
}
