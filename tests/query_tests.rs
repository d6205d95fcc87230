mod common;

use chrono::{Duration, Utc};
use common::TestHarness;
use costgpt::{
    aggregation::Dimension,
    config::Config,
    ingestion::UsageEventInput,
    query::{
        DateRange, EventCursor, EventFilter, PageRequest, QueryError, QueryService,
        UNATTRIBUTED_FEATURE, UNATTRIBUTED_USER,
    },
    test_utils::TestServerBuilder,
};
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

const SONNET: &str = "claude-sonnet-4-20250514";

async fn ingest_at(harness: &TestHarness, input: UsageEventInput, hours_ago: i64) -> Uuid {
    let input = UsageEventInput {
        timestamp: Some(Utc::now() - Duration::hours(hours_ago)),
        ..input
    };
    harness
        .server
        .ingest_test_event(harness.customer_id, input)
        .await
        .id
}

#[tokio::test]
async fn test_cursor_paging_visits_each_event_once_newest_first() {
    let harness = TestHarness::new().await;
    let mut expected = Vec::new();
    for hours_ago in 0..25 {
        expected.push(ingest_at(&harness, UsageEventInput::new("gpt-4o", 10, 10), hours_ago).await);
    }
    // Two events sharing one timestamp are split by id
    let shared = Utc::now() - Duration::hours(30);
    for _ in 0..2 {
        let input = UsageEventInput {
            timestamp: Some(shared),
            ..UsageEventInput::new("gpt-4o", 1, 1)
        };
        harness.server.ingest_test_event(harness.customer_id, input).await;
    }

    let query = &harness.server.query;
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = query
            .query_events(
                harness.customer_id,
                EventFilter::default(),
                PageRequest {
                    cursor: cursor.take(),
                    limit: Some(4),
                },
            )
            .await
            .unwrap();
        assert!(page.events.len() <= 4);
        seen.extend(page.events);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 27);
    let unique: HashSet<_> = seen.iter().map(|e| e.id).collect();
    assert_eq!(unique.len(), 27);
    for pair in seen.windows(2) {
        assert!((pair[0].timestamp, pair[0].id) > (pair[1].timestamp, pair[1].id));
    }
    assert_eq!(&seen.iter().take(25).map(|e| e.id).collect::<Vec<_>>(), &expected);
}

#[tokio::test]
async fn test_stream_events_yields_everything() {
    let mut config = Config::default();
    config.api_keys.secret = "stream-secret".to_string();
    config.query.default_page_size = 3;
    let harness = TestHarness::from_builder(TestServerBuilder::new().with_config(config)).await;

    for hours_ago in 0..10 {
        ingest_at(&harness, UsageEventInput::new(SONNET, 1, 1), hours_ago).await;
    }

    let events: Vec<_> = harness
        .server
        .query
        .stream_events(harness.customer_id, EventFilter::default(), None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(events.len(), 10);
}

#[tokio::test]
async fn test_event_filters_and_window() {
    let harness = TestHarness::new().await;
    ingest_at(
        &harness,
        UsageEventInput {
            user_id: Some("alice".to_string()),
            ..UsageEventInput::new(SONNET, 1, 1)
        },
        1,
    )
    .await;
    ingest_at(&harness, UsageEventInput::new("gpt-4o", 1, 1), 2).await;
    // Outside the default 30 day window
    ingest_at(&harness, UsageEventInput::new("gpt-4o", 1, 1), 24 * 45).await;

    let query = &harness.server.query;
    let all = query
        .query_events(harness.customer_id, EventFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.events.len(), 2);
    assert!(all.next_cursor.is_none());

    let by_model = query
        .query_events(
            harness.customer_id,
            EventFilter {
                model: Some("gpt-4o".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_model.events.len(), 1);

    let by_user = query
        .query_events(
            harness.customer_id,
            EventFilter {
                user_id: Some("alice".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_user.events.len(), 1);
    assert_eq!(by_user.events[0].model, SONNET);

    let old = query
        .query_events(
            harness.customer_id,
            EventFilter {
                start: Some(Utc::now() - Duration::days(60)),
                end: Some(Utc::now() - Duration::days(40)),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(old.events.len(), 1);
}

#[tokio::test]
async fn test_window_and_limit_bounds() {
    let harness = TestHarness::new().await;
    let query = &harness.server.query;
    let now = Utc::now();

    let too_wide = query
        .query_events(
            harness.customer_id,
            EventFilter {
                start: Some(now - Duration::days(400)),
                end: Some(now),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await;
    assert!(matches!(too_wide, Err(QueryError::Validation(_))));

    let inverted = query
        .query_events(
            harness.customer_id,
            EventFilter {
                start: Some(now),
                end: Some(now - Duration::days(1)),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await;
    assert!(matches!(inverted, Err(QueryError::Validation(_))));

    let zero = query
        .query_events(
            harness.customer_id,
            EventFilter::default(),
            PageRequest {
                cursor: None,
                limit: Some(0),
            },
        )
        .await;
    assert!(matches!(zero, Err(QueryError::Validation(_))));

    for hours_ago in 0..3 {
        ingest_at(&harness, UsageEventInput::new(SONNET, 1, 1), hours_ago).await;
    }
    let capped = query
        .query_events(
            harness.customer_id,
            EventFilter::default(),
            PageRequest {
                cursor: None,
                limit: Some(1_000_000),
            },
        )
        .await
        .unwrap();
    assert_eq!(capped.events.len(), 3);

    let rollups = query
        .query_rollups(
            harness.customer_id,
            DateRange::new(now.date_naive() - Duration::days(400), now.date_naive()),
            &[],
        )
        .await;
    assert!(matches!(rollups, Err(QueryError::Validation(_))));
}

#[tokio::test]
async fn test_invalid_cursor_is_rejected() {
    let harness = TestHarness::new().await;

    let result = harness
        .server
        .query
        .query_events(
            harness.customer_id,
            EventFilter::default(),
            PageRequest {
                cursor: Some("definitely-not-a-cursor".to_string()),
                limit: None,
            },
        )
        .await;
    assert!(matches!(result, Err(QueryError::InvalidCursor(_))));
}

#[tokio::test]
async fn test_cursor_window_is_bounded_like_a_request_window() {
    let harness = TestHarness::new().await;
    ingest_at(&harness, UsageEventInput::new(SONNET, 1, 1), 1).await;
    let now = Utc::now();

    let forged = EventCursor {
        timestamp: now,
        id: Uuid::new_v4(),
        window_start: now - Duration::days(365 * 50),
        window_end: now + Duration::days(1),
    }
    .encode();

    let result = harness
        .server
        .query
        .query_events(
            harness.customer_id,
            EventFilter::default(),
            PageRequest {
                cursor: Some(forged),
                limit: None,
            },
        )
        .await;
    assert!(matches!(result, Err(QueryError::InvalidCursor(_))));

    let within_bounds = EventCursor {
        timestamp: now,
        id: Uuid::nil(),
        window_start: now - Duration::days(7),
        window_end: now,
    }
    .encode();
    let page = harness
        .server
        .query
        .query_events(
            harness.customer_id,
            EventFilter::default(),
            PageRequest {
                cursor: Some(within_bounds),
                limit: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.events.len(), 1);
}

#[tokio::test]
async fn test_slow_query_times_out() {
    let harness = TestHarness::new().await;
    let mut config = harness.server.config.query.clone();
    config.timeout_ms = 50;
    let query = QueryService::new(harness.server.database.clone(), &config);

    // The in-memory pool has a single connection; holding it stalls every query
    let held = harness.server.database.connection().begin().await.unwrap();

    let result = query.summary(harness.customer_id, 7).await;
    assert!(matches!(result, Err(QueryError::Timeout(50))));

    let result = query
        .query_events(harness.customer_id, EventFilter::default(), PageRequest::default())
        .await;
    assert!(matches!(result, Err(QueryError::Timeout(50))));

    held.rollback().await.unwrap();
    assert!(query.summary(harness.customer_id, 7).await.is_ok());
}

#[tokio::test]
async fn test_rollups_grouping_and_order() {
    let harness = TestHarness::new().await;
    let today = Utc::now().date_naive();

    // gpt-4o: 2 * (100*2.5 + 100*10)/1M = 0.0025; sonnet: 1000*3/1M + 1000*15/1M = 0.018
    for _ in 0..2 {
        ingest_at(
            &harness,
            UsageEventInput {
                user_id: Some("bob".to_string()),
                ..UsageEventInput::new("gpt-4o", 100, 100)
            },
            0,
        )
        .await;
    }
    ingest_at(
        &harness,
        UsageEventInput {
            user_id: Some("alice".to_string()),
            feature: Some("search".to_string()),
            ..UsageEventInput::new(SONNET, 1000, 1000)
        },
        0,
    )
    .await;

    let query = &harness.server.query;
    let range = DateRange::new(today - Duration::days(1), today);

    let by_model = query
        .query_rollups(harness.customer_id, range, &[Dimension::Model])
        .await
        .unwrap();
    assert_eq!(by_model.len(), 2);
    assert_eq!(by_model[0].model.as_deref(), Some(SONNET));
    assert_eq!(by_model[0].total_cost, Decimal::from_str("0.018").unwrap());
    assert_eq!(by_model[1].model.as_deref(), Some("gpt-4o"));
    assert_eq!(by_model[1].total_calls, 2);
    assert!(by_model[0].user_id.is_none());

    let total = query
        .query_rollups(harness.customer_id, range, &[])
        .await
        .unwrap();
    assert_eq!(total.len(), 1);
    assert_eq!(total[0].total_calls, 3);
    assert_eq!(total[0].total_cost, Decimal::from_str("0.0205").unwrap());

    let by_user_feature = query
        .query_rollups(
            harness.customer_id,
            range,
            &[Dimension::UserId, Dimension::Feature],
        )
        .await
        .unwrap();
    assert_eq!(by_user_feature.len(), 2);
    assert_eq!(by_user_feature[0].user_id.as_deref(), Some("alice"));
    assert_eq!(by_user_feature[0].feature.as_deref(), Some("search"));
    assert_eq!(by_user_feature[1].feature.as_deref(), Some(""));

    let empty = query
        .query_rollups(
            harness.customer_id,
            DateRange::new(today - Duration::days(10), today - Duration::days(5)),
            &[],
        )
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_summary_is_zero_filled() {
    let harness = TestHarness::new().await;
    ingest_at(&harness, UsageEventInput::new(SONNET, 1500, 800), 0).await;
    ingest_at(&harness, UsageEventInput::new(SONNET, 1500, 800), 48).await;

    let summary = harness
        .server
        .query
        .summary(harness.customer_id, 7)
        .await
        .unwrap();
    assert_eq!(summary.days, 7);
    assert_eq!(summary.daily.len(), 7);
    assert_eq!(summary.total_calls, 2);
    assert_eq!(summary.total_input_tokens, 3000);
    assert_eq!(summary.total_cost, Decimal::from_str("0.033").unwrap());
    assert_eq!(summary.daily.iter().map(|d| d.calls).sum::<i64>(), 2);
    assert_eq!(summary.daily.last().unwrap().date, Utc::now().date_naive());
    assert_eq!(summary.daily.iter().filter(|d| d.calls == 0).count(), 5);

    let invalid = harness.server.query.summary(harness.customer_id, 91).await;
    assert!(matches!(invalid, Err(QueryError::Validation(_))));
}

#[tokio::test]
async fn test_breakdowns_label_unattributed_spend() {
    let harness = TestHarness::new().await;
    ingest_at(
        &harness,
        UsageEventInput {
            feature: Some("chat".to_string()),
            ..UsageEventInput::new(SONNET, 1000, 1000)
        },
        0,
    )
    .await;
    ingest_at(&harness, UsageEventInput::new("gpt-4o", 10, 10), 0).await;

    let query = &harness.server.query;

    let by_model = query
        .cost_by(harness.customer_id, Dimension::Model, 30)
        .await
        .unwrap();
    assert_eq!(by_model.len(), 2);

    let by_feature = query
        .cost_by(harness.customer_id, Dimension::Feature, 30)
        .await
        .unwrap();
    assert_eq!(by_feature.len(), 2);
    assert_eq!(by_feature[0].key, "chat");
    assert_eq!(by_feature[1].key, UNATTRIBUTED_FEATURE);

    let by_user = query
        .cost_by(harness.customer_id, Dimension::UserId, 30)
        .await
        .unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].key, UNATTRIBUTED_USER);
    assert_eq!(by_user[0].calls, 2);

    let summary = query.summary(harness.customer_id, 30).await.unwrap();
    assert_eq!(
        by_feature.iter().map(|row| row.total_cost).sum::<Decimal>(),
        summary.total_cost
    );
}

#[tokio::test]
async fn test_customers_only_see_their_own_data() {
    let harness = TestHarness::new().await;
    ingest_at(&harness, UsageEventInput::new(SONNET, 10, 10), 0).await;

    let other = harness.server.create_test_customer("other@example.com").await;
    let page = harness
        .server
        .query
        .query_events(other.id, EventFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert!(page.events.is_empty());

    let summary = harness.server.query.summary(other.id, 30).await.unwrap();
    assert_eq!(summary.total_calls, 0);
    assert_eq!(summary.total_cost, Decimal::ZERO);
}
