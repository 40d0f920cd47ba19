use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Calls `f` right away and then once per `interval` until it breaks.
///
/// A call that overruns the interval delays the next one instead of bursting.
pub async fn new<T, F, Fut>(interval: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
{
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let ControlFlow::Break(ret) = f().await {
            break ret;
        }
    }
}

/// Like [`new`], bounded by `limit`. `None` when the limit ran out first.
pub async fn within<T, F, Fut>(limit: Duration, interval: Duration, f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
{
    tokio::time::timeout(limit, new(interval, f)).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let start = tokio::time::Instant::now();
        let ret = new(Duration::from_secs(10), || async { ControlFlow::Break(7) }).await;
        assert_eq!(ret, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_break() {
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();
        new(Duration::from_millis(100), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        })
        .await;
        assert_eq!(calls.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn within_gives_up() {
        let ret = within(Duration::from_millis(250), Duration::from_millis(100), || async {
            ControlFlow::<()>::Continue(())
        })
        .await;
        assert!(ret.is_none());
    }
}
