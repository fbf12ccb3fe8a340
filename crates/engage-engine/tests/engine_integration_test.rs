use chrono::{Duration, Utc};
use engage_engine::{MemoryStore, SubmissionArbiter, TaskLifecycle, TaskStatus, TaskStore};
use engage_gate::{BlockedRegion, EligibilityGate, EligibilityInputs, RegionPolicy};
use engage_rewards::{MemoryLedger, RewardLedger};
use engage_signals::{AcquisitionStrategy, ContentEvent, InteractionKind, SignalCollector};
use engage_types::{
    AttemptState, EngageError, EngineParams, RejectReason, RewardAmount, TaskCategory,
    TaskDefinition, TaskDifficulty, TaskId, UserId,
};
use std::sync::Arc;

fn article_task() -> TaskDefinition {
    TaskDefinition {
        id: TaskId::new("briefing"),
        title: "Read the morning briefing".to_string(),
        reward: RewardAmount::from_minor_units(150),
        difficulty: TaskDifficulty::Easy,
        category: TaskCategory::Article,
        content_url: Some("https://news.partner.example/briefing".to_string()),
        min_duration_seconds: 45,
        require_scrolling: true,
        min_scroll_percentage: 70,
        require_interaction: false,
        min_ad_clicks: 0,
        max_attempts: 3,
        time_limit_minutes: 30,
        requires_review: false,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    lifecycle: Arc<TaskLifecycle>,
    arbiter: SubmissionArbiter,
    ledger: Arc<RewardLedger>,
}

async fn harness() -> Harness {
    let params = EngineParams::default();
    let store = Arc::new(MemoryStore::new());
    store.put_task_definition(article_task()).await.unwrap();

    let policy = RegionPolicy::new([BlockedRegion {
        code: "XX".to_string(),
        name: "Testland".to_string(),
    }]);
    let gate = EligibilityGate::new(policy, params.clone());
    let lifecycle = Arc::new(TaskLifecycle::new(
        store.clone() as Arc<dyn TaskStore>,
        gate,
        params.clone(),
    ));
    let ledger = Arc::new(RewardLedger::new(Arc::new(MemoryLedger::new())));
    let arbiter = SubmissionArbiter::new(lifecycle.clone(), ledger.clone(), params);

    Harness {
        store,
        lifecycle,
        arbiter,
        ledger,
    }
}

async fn register_user(h: &Harness, user: &UserId, registered_days_ago: i64, referrals: u32) {
    h.store
        .put_eligibility_inputs(
            user,
            EligibilityInputs {
                region_code: Some("US".to_string()),
                account_disabled: false,
                registered_at: Utc::now() - Duration::days(registered_days_ago),
                qualifying_referrals: referrals,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_engagement_flow() {
    let h = harness().await;
    let user = UserId::from("reader-1");
    register_user(&h, &user, 1, 0).await;

    // Task is listed as assignable.
    let started = Utc::now();
    let views = h.lifecycle.list_tasks(&user, started).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, TaskStatus::Assignable);
    assert!(views[0].can_start);

    // Start: the server creates the attempt row in progress.
    let attempt = h
        .lifecycle
        .start_task(&user, &TaskId::from("briefing"), started)
        .await
        .unwrap();
    assert_eq!(attempt.state, AttemptState::InProgress);

    // The client-side collector accumulates signals from the cross-origin
    // fallback (partner content, different origin).
    let strategy = AcquisitionStrategy::select(
        "https://app.example.com",
        article_task().content_url.as_deref().unwrap(),
    );
    assert!(strategy.is_cross_origin());

    let collector = SignalCollector::new(attempt.id, strategy, &EngineParams::default());
    collector.on_content_event(ContentEvent::Loaded).await;
    for _ in 0..46 {
        collector.tick().await;
    }
    collector
        .on_content_event(ContentEvent::Scroll { percentage: 50 })
        .await;
    collector
        .on_content_event(ContentEvent::Scroll { percentage: 75 })
        .await;
    collector
        .on_content_event(ContentEvent::Interaction {
            kind: InteractionKind::Pointer,
        })
        .await;

    // Reported snapshot reaches the server monotonically.
    let reported = collector.snapshot().await;
    let stored = h
        .lifecycle
        .report_signal(attempt.id, &user, reported)
        .await
        .unwrap();
    assert!(stored.signals.cross_origin);
    assert_eq!(stored.signals.scroll_percentage, 75);

    // Submit just past the minimum duration: accepted, credited once.
    let outcome = h
        .arbiter
        .submit(
            attempt.id,
            &user,
            stored.signals,
            None,
            started + Duration::seconds(46),
        )
        .await
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(
        outcome.reward_granted,
        Some(RewardAmount::from_minor_units(150))
    );

    // Duplicate submission: no double payment.
    let again = h
        .arbiter
        .submit(
            attempt.id,
            &user,
            stored.signals,
            None,
            started + Duration::seconds(50),
        )
        .await
        .unwrap();
    assert!(again.accepted);
    assert_eq!(
        h.ledger.balance_of(&user).await.unwrap(),
        RewardAmount::from_minor_units(150)
    );

    // Task list reflects completion.
    let views = h
        .lifecycle
        .list_tasks(&user, started + Duration::seconds(60))
        .await
        .unwrap();
    assert!(views[0].is_completed);
    assert_eq!(views[0].progress, 100);
}

#[tokio::test]
async fn test_premature_submission_then_recovery() {
    let h = harness().await;
    let user = UserId::from("reader-2");
    register_user(&h, &user, 1, 0).await;

    let started = Utc::now();
    let attempt = h
        .lifecycle
        .start_task(&user, &TaskId::from("briefing"), started)
        .await
        .unwrap();

    // 30s elapsed, 50% scroll: the client is allowed to submit early and
    // is simply rejected without losing state.
    let early = engage_types::SignalSnapshot {
        elapsed_seconds: 30,
        scroll_percentage: 50,
        loaded: true,
        ..Default::default()
    };
    let err = h
        .arbiter
        .submit(attempt.id, &user, early, None, started + Duration::seconds(30))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngageError::InsufficientSignal(RejectReason::InsufficientTime)
    ));

    let ready = engage_types::SignalSnapshot {
        elapsed_seconds: 46,
        scroll_percentage: 75,
        loaded: true,
        ..Default::default()
    };
    let outcome = h
        .arbiter
        .submit(attempt.id, &user, ready, None, started + Duration::seconds(46))
        .await
        .unwrap();
    assert!(outcome.accepted);
}

#[tokio::test]
async fn test_region_and_referral_gates_end_to_end() {
    let h = harness().await;

    // Region-blocked user sees zero tasks however many definitions exist.
    let blocked = UserId::from("blocked-1");
    h.store
        .put_eligibility_inputs(
            &blocked,
            EligibilityInputs {
                region_code: Some("XX".to_string()),
                account_disabled: false,
                registered_at: Utc::now(),
                qualifying_referrals: 5,
            },
        )
        .await
        .unwrap();
    let err = h.lifecycle.list_tasks(&blocked, Utc::now()).await.unwrap_err();
    assert!(matches!(err, EngageError::RegionBlocked { .. }));

    // Past the trial window with no referrals: listing works, starting
    // does not.
    let lapsed = UserId::from("lapsed-1");
    register_user(&h, &lapsed, 30, 0).await;
    let views = h.lifecycle.list_tasks(&lapsed, Utc::now()).await.unwrap();
    assert_eq!(views[0].status, TaskStatus::Ineligible);
    let err = h
        .lifecycle
        .start_task(&lapsed, &TaskId::from("briefing"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngageError::ReferralRequired));
}

#[tokio::test]
async fn test_attempts_exhaust_after_max_rejections() {
    let h = harness().await;
    let user = UserId::from("reader-3");
    register_user(&h, &user, 1, 0).await;

    // Burn all three attempts on expiry.
    for index in 0..3 {
        let started = Utc::now();
        let attempt = h
            .lifecycle
            .start_task(&user, &TaskId::from("briefing"), started)
            .await
            .unwrap();
        assert_eq!(attempt.index, index);

        let ready = engage_types::SignalSnapshot {
            elapsed_seconds: 46,
            scroll_percentage: 75,
            loaded: true,
            ..Default::default()
        };
        let err = h
            .arbiter
            .submit(
                attempt.id,
                &user,
                ready,
                None,
                started + Duration::minutes(31),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngageError::AttemptExpired));
    }

    let err = h
        .lifecycle
        .start_task(&user, &TaskId::from("briefing"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngageError::AttemptsExhausted));

    let views = h.lifecycle.list_tasks(&user, Utc::now()).await.unwrap();
    assert_eq!(views[0].status, TaskStatus::Exhausted);
    assert_eq!(views[0].attempts_used, 3);
}
