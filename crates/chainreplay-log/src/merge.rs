//! K-way merge of ordered streams.

use std::cmp::Ordering;

use futures::stream::{self, BoxStream, StreamExt};

use crate::heap::OrderedHeap;

struct MergeState<'a, T, E, C> {
    sources: Vec<BoxStream<'a, Result<T, E>>>,
    heap: OrderedHeap<(T, usize), C>,
    /// Source whose head was yielded last and must be pulled before the next pop.
    refill: Option<usize>,
    primed: bool,
    done: bool,
}

impl<'a, T, E, C> MergeState<'a, T, E, C>
where
    C: Fn(&(T, usize), &(T, usize)) -> Ordering,
{
    async fn pull(&mut self, source: usize) -> Result<(), E> {
        match self.sources[source].next().await {
            Some(Ok(item)) => self.heap.push((item, source)),
            Some(Err(e)) => return Err(e),
            None => {}
        }
        Ok(())
    }

    async fn next_item(&mut self) -> Option<Result<T, E>> {
        if self.done {
            return None;
        }
        if !self.primed {
            self.primed = true;
            for source in 0..self.sources.len() {
                if let Err(e) = self.pull(source).await {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if let Some(source) = self.refill.take() {
            if let Err(e) = self.pull(source).await {
                self.done = true;
                return Some(Err(e));
            }
        }
        match self.heap.pop() {
            Some((item, source)) => {
                self.refill = Some(source);
                Some(Ok(item))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Merge individually ordered streams into one ordered stream.
///
/// At most one item per source is buffered. Items that compare equal are
/// yielded in source order. The first source error is yielded and ends the
/// merged stream.
pub fn merge_ordered<'a, T, E, F>(
    sources: Vec<BoxStream<'a, Result<T, E>>>,
    compare: F,
) -> BoxStream<'a, Result<T, E>>
where
    T: Send + 'a,
    E: Send + 'a,
    F: Fn(&T, &T) -> Ordering + Send + 'a,
{
    let heap = OrderedHeap::with_capacity(
        sources.len(),
        move |a: &(T, usize), b: &(T, usize)| compare(&a.0, &b.0).then(a.1.cmp(&b.1)),
    );
    let state = MergeState {
        sources,
        heap,
        refill: None,
        primed: false,
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        let item = state.next_item().await?;
        Some((item, state))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use proptest::prelude::*;

    fn source(items: Vec<Result<u32, String>>) -> BoxStream<'static, Result<u32, String>> {
        stream::iter(items).boxed()
    }

    fn ok_source(items: &[u32]) -> BoxStream<'static, Result<u32, String>> {
        source(items.iter().copied().map(Ok).collect())
    }

    #[tokio::test]
    async fn merges_in_order() {
        let merged: Vec<_> = merge_ordered(
            vec![ok_source(&[1, 3]), ok_source(&[2]), ok_source(&[])],
            |a: &u32, b: &u32| a.cmp(b),
        )
        .collect()
        .await;
        assert_eq!(merged, vec![Ok(1), Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn ties_follow_source_order() {
        let sources = vec![
            source(vec![Ok(10), Ok(20)]),
            source(vec![Ok(11), Ok(21)]),
        ];
        // Compare by tens only: 10 and 11 tie, as do 20 and 21.
        let merged: Vec<_> = merge_ordered(sources, |a: &u32, b: &u32| (a / 10).cmp(&(b / 10)))
            .collect()
            .await;
        assert_eq!(merged, vec![Ok(10), Ok(11), Ok(20), Ok(21)]);
    }

    #[tokio::test]
    async fn error_ends_the_stream() {
        let sources = vec![
            source(vec![Ok(1), Err("corrupt".into()), Ok(5)]),
            ok_source(&[2, 3, 4]),
        ];
        let merged: Vec<_> = merge_ordered(sources, |a: &u32, b: &u32| a.cmp(b))
            .collect()
            .await;
        assert_eq!(merged, vec![Ok(1), Err("corrupt".to_string())]);
    }

    #[tokio::test]
    async fn no_sources() {
        let merged: Vec<Result<u32, String>> = merge_ordered(vec![], |a: &u32, b: &u32| a.cmp(b))
            .collect()
            .await;
        assert!(merged.is_empty());
    }

    proptest! {
        #[test]
        fn merge_is_total_and_ordered(
            lists in proptest::collection::vec(proptest::collection::vec(0u32..1_000, 0..40), 0..8)
        ) {
            let sources = lists
                .iter()
                .map(|list| {
                    let mut sorted = list.clone();
                    sorted.sort_unstable();
                    ok_source(&sorted)
                })
                .collect();
            let merged: Vec<u32> = block_on(
                merge_ordered(sources, |a: &u32, b: &u32| a.cmp(b)).collect::<Vec<_>>(),
            )
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

            let mut expected: Vec<u32> = lists.into_iter().flatten().collect();
            expected.sort_unstable();
            prop_assert_eq!(merged, expected);
        }
    }
}
