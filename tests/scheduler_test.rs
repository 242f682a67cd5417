mod common;

use std::time::Duration as StdDuration;

use cardly::{domain::SubscriptionStatus, scheduler::{Scheduler, TickReport}};
use chrono::{Duration, Utc};
use common::harness;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_run_once_sweeps_and_warns() -> anyhow::Result<()> {
    let h = harness().await?;
    let ana = h.user("ana@example.com").await?;
    let bob = h.user("bob@example.com").await?;
    let pro = h.plan("Pro", dec!(20), 30).await?;

    let overdue = h.buy_and_settle(&ana, &pro, 1).await?;
    h.set_end_date(overdue.subscription_id, Utc::now() - Duration::days(1)).await?;

    let expiring = h.buy_and_settle(&bob, &pro, 1).await?;
    h.set_end_date(expiring.subscription_id, Utc::now() + Duration::days(3) - Duration::hours(2)).await?;

    let scheduler = Scheduler::new(h.context.lifecycle.clone(), StdDuration::from_secs(3600));

    assert_eq!(scheduler.run_once().await, TickReport { expired: 1, warned: 1 });
    assert_eq!(scheduler.run_once().await, TickReport { expired: 0, warned: 1 });

    let swept = h.context.ledger.find_subscription(overdue.subscription_id).await?.unwrap();
    assert_eq!(swept.status, SubscriptionStatus::Expired);
    Ok(())
}

#[tokio::test]
async fn test_start_and_stop() -> anyhow::Result<()> {
    let h = harness().await?;
    let user = h.user("ana@example.com").await?;
    let pro = h.plan("Pro", dec!(20), 30).await?;

    let created = h.buy_and_settle(&user, &pro, 1).await?;
    h.set_end_date(created.subscription_id, Utc::now() - Duration::minutes(1)).await?;

    let scheduler = Scheduler::new(h.context.lifecycle.clone(), StdDuration::from_secs(3600));
    assert!(!scheduler.is_running());

    scheduler.start();
    scheduler.start();
    assert!(scheduler.is_running());

    // The first tick fires right away.
    let mut expired = false;
    for _ in 0..50 {
        let subscription = h.context.ledger.find_subscription(created.subscription_id).await?.unwrap();
        if subscription.status == SubscriptionStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert!(expired);

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    Ok(())
}
