use std::future::Future;
use std::panic::resume_unwind;

use super::when_all_ready::when_all_ready;

/// Starts every future concurrently and resolves to the vector of values
/// once all have completed, or re-raises the panic payload of the
/// lowest-indexed one that failed (§4.10: "deterministic: the exception of
/// the lowest-index failing awaitable").
pub async fn when_all<T, F>(futures: Vec<F>) -> Vec<T>
where
    F: Future<Output = T> + Send + 'static,
{
    let mut results: Vec<Option<std::thread::Result<T>>> =
        when_all_ready(futures).await.into_iter().map(Some).collect();

    if let Some(index) = results.iter().position(|slot| matches!(slot, Some(Err(_)))) {
        match results[index].take().unwrap() {
            Err(payload) => resume_unwind(payload),
            Ok(_) => unreachable!(),
        }
    }

    results.into_iter().map(|slot| slot.unwrap().unwrap()).collect()
}
