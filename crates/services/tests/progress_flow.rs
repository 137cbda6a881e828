use chrono::{DateTime, Duration, Utc};
use practice_core::ProgressConfig;
use practice_core::aggregate::{TopicCatalog, merge_topic_stats};
use practice_core::model::{CardId, CardProgress, Identity, TopicId};
use practice_core::time::fixed_now;
use services::{AnswerSubmission, Clock, ProgressService, SessionKind};
use storage::repository::Storage;

fn card(id: &str) -> CardId {
    CardId::new(id).unwrap()
}

fn topic(id: &str) -> TopicId {
    TopicId::new(id).unwrap()
}

fn service_at(storage: &Storage, now: DateTime<Utc>) -> ProgressService {
    ProgressService::new(
        Clock::fixed(now),
        storage.clone(),
        ProgressConfig::default().with_admin_email("admin@example.com"),
    )
}

async fn answer(
    svc: &ProgressService,
    who: &Identity,
    c: &str,
    t: &str,
    correct: bool,
) -> CardProgress {
    let submission = AnswerSubmission::parse(c, t, correct, None).unwrap();
    svc.record_answer(who, &submission).await.unwrap()
}

fn counts(p: &CardProgress) -> (u32, u32, bool) {
    (p.correct, p.incorrect, p.mastered)
}

#[tokio::test]
async fn mastery_walkthrough_for_single_card() {
    let storage = Storage::in_memory();
    let svc = service_at(&storage, fixed_now());
    let kid = Identity::email("kid@example.com");
    svc.sign_in(&kid, "Kid").await.unwrap();

    let p = answer(&svc, &kid, "c1", "algebra", true).await;
    assert_eq!(counts(&p), (1, 0, false));
    answer(&svc, &kid, "c1", "algebra", true).await;
    let p = answer(&svc, &kid, "c1", "algebra", true).await;
    assert_eq!(counts(&p), (3, 0, true));
    let p = answer(&svc, &kid, "c1", "algebra", false).await;
    assert_eq!(counts(&p), (3, 1, true));

    let map = svc.progress_map(&kid).await.unwrap();
    assert_eq!(map[&card("c1")], p);
}

#[tokio::test]
async fn needs_work_overlaps_with_mastered() {
    let storage = Storage::in_memory();
    let kid = Identity::email("kid@example.com");
    let start = fixed_now();
    service_at(&storage, start).sign_in(&kid, "Kid").await.unwrap();

    let plan = [
        ("c1", true),
        ("c1", true),
        ("c1", true),
        ("c2", true),
        ("c3", false),
        ("c1", false),
    ];
    for (i, (c, correct)) in plan.into_iter().enumerate() {
        let svc = service_at(&storage, start + Duration::minutes(i64::try_from(i).unwrap()));
        answer(&svc, &kid, c, "algebra", correct).await;
    }

    let svc = service_at(&storage, start + Duration::hours(1));
    let needs = svc.needs_work(&kid).await.unwrap();
    assert_eq!(needs, vec![card("c1"), card("c3")]);

    let map = svc.progress_map(&kid).await.unwrap();
    assert!(map[&card("c1")].mastered);
    for (id, row) in &map {
        assert_eq!(needs.contains(id), row.incorrect >= 1);
    }
}

#[tokio::test]
async fn topic_stats_are_stable_and_sum_to_totals() {
    let storage = Storage::in_memory();
    let svc = service_at(&storage, fixed_now());
    let kid = Identity::email("kid@example.com");
    svc.sign_in(&kid, "Kid").await.unwrap();

    for (c, t, correct) in [
        ("a1", "algebra", true),
        ("a2", "algebra", false),
        ("a1", "algebra", true),
        ("g1", "geometry", true),
        ("f1", "fractions", false),
    ] {
        answer(&svc, &kid, c, t, correct).await;
    }

    let first = svc.dashboard(&kid).await.unwrap();
    let second = svc.dashboard(&kid).await.unwrap();
    assert_eq!(first.topic_stats, second.topic_stats);

    let summed: u32 = first.topic_stats.iter().map(|s| s.attempts).sum();
    assert_eq!(summed, first.totals.attempts);
    assert_eq!(first.totals.attempts, 5);

    let algebra = &first.topic_stats[0];
    assert_eq!(algebra.topic_id, topic("algebra"));
    assert_eq!((algebra.attempts, algebra.correct, algebra.unique_cards), (3, 2, 2));

    let catalog = [topic("algebra"), topic("decimals"), topic("fractions"), topic("geometry")];
    let merged = merge_topic_stats(&catalog, first.topic_stats.clone());
    assert_eq!(merged.len(), 4);
    assert_eq!(merged[1].attempts, 0);
    assert_eq!(merged[1].last_attempt, None);
}

#[tokio::test]
async fn streak_counts_back_from_today_or_yesterday() {
    let kid = Identity::email("kid@example.com");
    let today = fixed_now();

    // D, D-1, D-2 practiced, D-3 idle, D-4 practiced.
    let storage = Storage::in_memory();
    service_at(&storage, today - Duration::days(10))
        .sign_in(&kid, "Kid")
        .await
        .unwrap();
    for days_ago in [4, 2, 1, 0] {
        let svc = service_at(&storage, today - Duration::days(days_ago));
        answer(&svc, &kid, "c1", "algebra", true).await;
    }
    let dash = service_at(&storage, today).dashboard(&kid).await.unwrap();
    assert_eq!(dash.streak_days, 3);

    // Nothing yet today: D-1 and D-2 still count.
    let storage = Storage::in_memory();
    service_at(&storage, today - Duration::days(10))
        .sign_in(&kid, "Kid")
        .await
        .unwrap();
    for days_ago in [4, 2, 1] {
        let svc = service_at(&storage, today - Duration::days(days_ago));
        answer(&svc, &kid, "c1", "algebra", true).await;
    }
    let dash = service_at(&storage, today).dashboard(&kid).await.unwrap();
    assert_eq!(dash.streak_days, 2);
    assert_eq!(dash.attempts_today, 0);
    assert_eq!(dash.daily_goal.progress, 0);
}

#[tokio::test]
async fn long_streak_is_not_cut_at_the_default_date_limit() {
    let kid = Identity::email("kid@example.com");
    let today = fixed_now();
    let storage = Storage::in_memory();
    service_at(&storage, today - Duration::days(100))
        .sign_in(&kid, "Kid")
        .await
        .unwrap();
    for days_ago in (0..75).rev() {
        let svc = service_at(&storage, today - Duration::days(days_ago));
        answer(&svc, &kid, "c1", "algebra", true).await;
    }
    let dash = service_at(&storage, today).dashboard(&kid).await.unwrap();
    assert_eq!(dash.streak_days, 75);
}

#[tokio::test]
async fn resume_pointer_feeds_start_position() {
    let storage = Storage::in_memory();
    let svc = service_at(&storage, fixed_now());
    let kid = Identity::email("kid@example.com");
    svc.sign_in(&kid, "Kid").await.unwrap();

    let submission = AnswerSubmission::parse("c3", "algebra", true, Some("c7")).unwrap();
    svc.record_answer(&kid, &submission).await.unwrap();
    assert_eq!(
        svc.topic_resume(&kid, &topic("algebra")).await.unwrap(),
        Some(card("c7"))
    );

    let session = SessionKind::Topic(topic("algebra"));
    let order = vec![card("c1"), card("c3"), card("c7")];
    assert_eq!(svc.start_position(&kid, &session, &order).await.unwrap(), 2);

    let without = vec![card("c1"), card("c3")];
    assert_eq!(svc.start_position(&kid, &session, &without).await.unwrap(), 0);
    assert_eq!(
        svc.start_position(&kid, &SessionKind::NeedsWork, &order)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn admin_summaries_list_idle_users_with_zeros() {
    let storage = Storage::in_memory();
    let svc = service_at(&storage, fixed_now());
    let kid = Identity::email("kid@example.com");
    let idle = Identity::legacy("Sam", "4321");
    svc.sign_in(&kid, "Kid").await.unwrap();
    service_at(&storage, fixed_now() + Duration::minutes(1))
        .sign_in(&idle, "")
        .await
        .unwrap();
    answer(&svc, &kid, "c1", "algebra", true).await;

    let admin = Identity::email("admin@example.com");
    let rows = svc.admin_summaries(&admin).await.unwrap();
    assert_eq!(rows.len(), 2);
    let sam = rows.iter().find(|r| r.user.display_name == "Sam").unwrap();
    assert_eq!(sam.total_attempts, 0);
    assert_eq!(sam.correct_attempts, 0);
    assert_eq!(sam.last_attempt_at, None);

    let overview = svc.admin_overview(&admin).await.unwrap();
    assert_eq!(overview.total_users, 2);
    assert_eq!(overview.total_attempts, 1);
}

#[tokio::test]
async fn recorded_attempt_heads_the_recent_feed() {
    let storage = Storage::in_memory();
    let kid = Identity::email("kid@example.com");
    service_at(&storage, fixed_now()).sign_in(&kid, "Kid").await.unwrap();

    answer(&service_at(&storage, fixed_now()), &kid, "c1", "algebra", true).await;
    let later = fixed_now() + Duration::minutes(5);
    let svc = service_at(&storage, later);
    answer(&svc, &kid, "g4", "geometry", false).await;

    let user = svc.sign_in(&kid, "").await.unwrap();
    let recent = svc.aggregation().recent_attempts(user.id, 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].card_id, card("g4"));
    assert_eq!(recent[0].topic_id, topic("geometry"));
    assert!(!recent[0].correct);
    assert_eq!(recent[0].attempted_at, later);
}

#[tokio::test]
async fn topic_completion_follows_catalog() {
    let storage = Storage::in_memory();
    let svc = service_at(&storage, fixed_now());
    let kid = Identity::email("kid@example.com");
    svc.sign_in(&kid, "Kid").await.unwrap();
    for _ in 0..3 {
        answer(&svc, &kid, "a1", "algebra", true).await;
    }
    answer(&svc, &kid, "a2", "algebra", false).await;

    let catalog = vec![
        TopicCatalog {
            topic_id: topic("algebra"),
            card_ids: vec![card("a1"), card("a2"), card("a3"), card("a4")],
        },
        TopicCatalog {
            topic_id: topic("geometry"),
            card_ids: vec![card("g1")],
        },
    ];
    let completion = svc.topic_completion(&kid, &catalog).await.unwrap();
    assert_eq!(completion[0].attempted, 2);
    assert_eq!(completion[0].mastered, 1);
    assert_eq!(completion[0].mastered_percent(), 25);
    assert_eq!(completion[1].attempted, 0);
}
